//! Native module loaded from a shared library
//!
//! Desktop builds of the image-processing library export the same four calls as
//! the WebAssembly build, with C linkage. The address space is the host
//! process itself, so regions come from the C allocator.

use std::ffi::{c_char, c_int};
use std::path::Path;
use std::ptr;

use libloading::Library;

use crate::console_log;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::{NativeHeap, Ptr};
use crate::native::NativeModule;

/// `bool configure(const char *config_json);`
pub type ConfigureFn = unsafe extern "C" fn(config: *const c_char) -> bool;

/// `bool set_image(const unsigned char *data, int len, char *out_key);`
pub type SetImageFn = unsafe extern "C" fn(data: *const u8, len: c_int, out_key: *mut c_char) -> bool;

/// `bool detect_landmarks(const char *key, char *out_landmarks);`
pub type DetectLandmarksFn = unsafe extern "C" fn(key: *const c_char, out: *mut c_char) -> bool;

/// `int create_tiled_print(const char *key, const char *request, unsigned char *out_png);`
pub type CreateTiledPrintFn =
    unsafe extern "C" fn(key: *const c_char, request: *const c_char, out: *mut u8) -> c_int;

/// The C heap of the current process
#[derive(Debug, Default)]
pub struct ProcessHeap;

impl NativeHeap for ProcessHeap {
    fn malloc(&mut self, size: usize) -> Option<Ptr> {
        // SAFETY: plain C allocation; a null result is reported as exhaustion.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        if ptr.is_null() {
            None
        } else {
            Some(ptr as Ptr)
        }
    }

    fn free(&mut self, ptr: Ptr) {
        // SAFETY: ptr came from `malloc` above; the arena frees each block once.
        unsafe { libc::free(ptr as *mut libc::c_void) }
    }

    fn write(&mut self, ptr: Ptr, data: &[u8]) {
        // SAFETY: the arena bounds-checks `data` against the block size.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len()) }
    }

    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        // SAFETY: the arena never reads past the block size.
        unsafe { ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), len) }
        out
    }
}

/// Image-processing library loaded with `libloading`
pub struct SharedLibrary {
    /// Keeps the symbols below valid
    #[allow(dead_code)]
    library: Library,

    /// Path to the library file.
    pub path: String,

    heap: ProcessHeap,
    configure: ConfigureFn,
    set_image: SetImageFn,
    detect_landmarks: DetectLandmarksFn,
    create_tiled_print: CreateTiledPrintFn,
}

impl SharedLibrary {
    /// Load the library and resolve all four symbols.
    ///
    /// The library's initializers run on load. The exported symbols are
    /// trusted to match the signatures above.
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let library = unsafe { Library::new(path) }.map_err(|e| BridgeError::load(&path_str, e))?;

        let configure: ConfigureFn = unsafe { Self::symbol(&library, &path_str, b"configure\0")? };
        let set_image: SetImageFn = unsafe { Self::symbol(&library, &path_str, b"set_image\0")? };
        let detect_landmarks: DetectLandmarksFn =
            unsafe { Self::symbol(&library, &path_str, b"detect_landmarks\0")? };
        let create_tiled_print: CreateTiledPrintFn =
            unsafe { Self::symbol(&library, &path_str, b"create_tiled_print\0")? };

        console_log!("Loaded native library {}", path_str);

        Ok(SharedLibrary {
            library,
            path: path_str,
            heap: ProcessHeap,
            configure,
            set_image,
            detect_landmarks,
            create_tiled_print,
        })
    }

    unsafe fn symbol<T: Copy>(library: &Library, path: &str, name: &[u8]) -> BridgeResult<T> {
        library.get::<T>(name).map(|s| *s).map_err(|e| {
            let name = String::from_utf8_lossy(&name[..name.len() - 1]);
            BridgeError::load(path, format!("symbol '{}': {}", name, e))
        })
    }
}

impl NativeHeap for SharedLibrary {
    fn malloc(&mut self, size: usize) -> Option<Ptr> {
        self.heap.malloc(size)
    }

    fn free(&mut self, ptr: Ptr) {
        self.heap.free(ptr)
    }

    fn write(&mut self, ptr: Ptr, data: &[u8]) {
        self.heap.write(ptr, data)
    }

    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        self.heap.read(ptr, len)
    }
}

impl NativeModule for SharedLibrary {
    fn configure(&mut self, config: Ptr) -> bool {
        unsafe { (self.configure)(config as *const c_char) }
    }

    fn set_image(&mut self, image: Ptr, len: usize, out_key: Ptr) -> bool {
        let Ok(len) = c_int::try_from(len) else {
            return false;
        };
        unsafe { (self.set_image)(image as *const u8, len, out_key as *mut c_char) }
    }

    fn detect_landmarks(&mut self, key: Ptr, out_landmarks: Ptr) -> bool {
        unsafe { (self.detect_landmarks)(key as *const c_char, out_landmarks as *mut c_char) }
    }

    fn create_tiled_print(&mut self, key: Ptr, request: Ptr, out_image: Ptr) -> usize {
        let written = unsafe {
            (self.create_tiled_print)(key as *const c_char, request as *const c_char, out_image as *mut u8)
        };
        // Negative lengths are failures too
        usize::try_from(written).unwrap_or(0)
    }
}
