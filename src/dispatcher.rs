//! Command dispatcher
//!
//! Single entry point for all traffic to the native module. Requests are queued
//! in arrival order and executed one at a time, each to completion, and every
//! accepted request yields exactly one response.
//!
//! State machine:
//!
//! ```text
//!            submit + pump
//!   Idle ─────────────────► Busy(kind) ──── response emitted ───► Idle
//!                               │
//!                               └── arena/codec error ─► Failed(kind) ── error emitted ─► Idle
//! ```
//!
//! `Failed` is never terminal; a failed request cannot affect the ones after it.

use std::collections::VecDeque;

use crate::arena::Arena;
use crate::bootstrap::{self, Readiness};
use crate::codec;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{ImageKey, LandmarkPair, PixelBuffer, TiledPrintRequest};
use crate::native::NativeModule;
use crate::protocol::{CommandKind, Request, Response};
use crate::{console_error, console_log};

/// Dispatcher state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Busy(CommandKind),
    Failed(CommandKind),
}

/// Counters over the lifetime of a dispatcher
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests that produced a response
    pub processed: u64,
    /// Requests answered with an error
    pub failed: u64,
    /// Requests rejected without touching the native module
    pub rejected: u64,
}

/// Sequences requests onto a non-reentrant native module
pub struct Dispatcher<M: NativeModule> {
    module: M,
    config: BridgeConfig,
    readiness: Readiness,
    state: DispatchState,

    queue: VecDeque<(u32, Request)>,
    outbox: VecDeque<Response>,
    next_seq: u32,

    stats: DispatchStats,
}

impl<M: NativeModule> Dispatcher<M> {
    /// Wrap `module`. Fails if `config` does not pass [`BridgeConfig::validate`].
    pub fn new(module: M, config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Dispatcher {
            module,
            config,
            readiness: Readiness::Pending,
            state: DispatchState::Idle,
            queue: VecDeque::new(),
            outbox: VecDeque::new(),
            next_seq: 0,
            stats: DispatchStats::default(),
        })
    }

    /// Queue a request. Returns the sequence number its response will carry.
    pub fn submit(&mut self, request: Request) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.queue.push_back((seq, request));
        seq
    }

    /// Run queued requests until the queue is empty.
    ///
    /// Returns the number of requests processed.
    pub fn pump(&mut self) -> usize {
        if self.state != DispatchState::Idle {
            return 0;
        }
        let mut processed = 0;
        while let Some((seq, request)) = self.queue.pop_front() {
            self.step(seq, request);
            processed += 1;
        }
        processed
    }

    /// Submit one request and run the queue.
    pub fn dispatch(&mut self, request: Request) -> u32 {
        let seq = self.submit(request);
        self.pump();
        seq
    }

    /// Drain emitted responses in emission order.
    pub fn take_responses(&mut self) -> Vec<Response> {
        self.outbox.drain(..).collect()
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// Requests waiting behind the current one
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    fn step(&mut self, seq: u32, request: Request) {
        let kind = request.kind();
        self.state = DispatchState::Busy(kind);
        console_log!("dispatch #{} {}", seq, kind.as_str());

        let response = match self.execute(seq, request) {
            Ok(response) => response,
            Err(err) => {
                self.state = DispatchState::Failed(kind);
                self.stats.failed += 1;
                if err.is_local_rejection() {
                    self.stats.rejected += 1;
                }
                console_error!("dispatch #{} {} failed: {}", seq, kind.as_str(), err);
                Response::error(seq, kind, &err)
            }
        };

        self.stats.processed += 1;
        self.outbox.push_back(response);
        self.state = DispatchState::Idle;
    }

    fn execute(&mut self, seq: u32, request: Request) -> BridgeResult<Response> {
        if request.kind().requires_configuration() && !self.is_ready() {
            return Err(BridgeError::NotConfigured);
        }

        match request {
            Request::Configure { config } => self.configure(seq, config),
            Request::SetImage { image_data } => {
                let img_key = self.set_image(&image_data)?;
                Ok(Response::ImageSet { seq, img_key })
            }
            Request::DetectLandmarks { img_key } => {
                let landmarks = self.detect_landmarks(&img_key)?;
                Ok(Response::LandmarksDetected { seq, landmarks })
            }
            Request::CreateTiledPrint { request } => {
                let png_data = self.create_tiled_print(&request)?;
                Ok(Response::TiledPrintCreated { seq, png_data })
            }
        }
    }

    /// Startup handshake. Any failure leaves the session permanently unready
    /// and is reported as the startup-failure event.
    fn configure(&mut self, seq: u32, config: bootstrap::ConfigBundle) -> BridgeResult<Response> {
        if self.readiness != Readiness::Pending {
            return Err(BridgeError::AlreadyConfigured);
        }

        match bootstrap::run(&mut self.module, config) {
            Ok(()) => {
                self.readiness = Readiness::Ready;
                console_log!("native module ready");
                Ok(Response::RuntimeInitialized { seq })
            }
            Err(err) => {
                self.readiness = Readiness::Failed;
                console_error!("native module configuration failed: {}", err);
                self.stats.failed += 1;
                Ok(Response::RuntimeFailed {
                    seq,
                    message: err.to_string(),
                })
            }
        }
    }

    fn set_image(&mut self, image: &PixelBuffer) -> BridgeResult<ImageKey> {
        let key_ceiling = self.config.key_ceiling;
        let mut arena = Arena::new(&mut self.module);

        let input = arena.allocate_with(image.as_bytes())?;
        let out_key = arena.allocate(key_ceiling)?;
        arena.write(out_key, &[0])?;

        let ok = arena.native().set_image(input.ptr(), image.len(), out_key.ptr());
        arena.release(input);

        if !ok {
            return Err(BridgeError::native_failed("set_image", "image was not accepted"));
        }
        let key = arena.read_c_str(out_key)?;
        if key.is_empty() {
            return Err(BridgeError::native_failed("set_image", "no image key returned"));
        }
        Ok(ImageKey::new(key))
    }

    fn detect_landmarks(&mut self, img_key: &ImageKey) -> BridgeResult<LandmarkPair> {
        let ceiling = self.config.landmark_ceiling;
        let key_bytes = codec::encode_utf8_cstring(img_key.as_str())?;
        let mut arena = Arena::new(&mut self.module);

        let key = arena.allocate_with(&key_bytes)?;
        let out = arena.allocate(ceiling)?;
        arena.write(out, &[0])?;

        let ok = arena.native().detect_landmarks(key.ptr(), out.ptr());
        // A full region without a terminator means the module wrote past it
        let text = arena.read_c_str(out).map_err(|err| match err {
            BridgeError::BufferOverflow { ceiling, .. } => BridgeError::MalformedResponse(format!(
                "landmark output filled the {}-byte region without a terminator",
                ceiling
            )),
            other => other,
        })?;

        if !ok && text.is_empty() {
            // Domain failure without a description from the module
            return Ok(LandmarkPair::failed(format!(
                "landmark detection failed for image '{}'",
                img_key
            )));
        }

        let landmarks: LandmarkPair = codec::decode_json(text.as_bytes())?;
        let landmarks = landmarks.validate()?;
        if !ok && landmarks.is_detected() {
            return Err(BridgeError::MalformedResponse(
                "detection reported failure but returned landmarks".to_string(),
            ));
        }
        Ok(landmarks)
    }

    fn create_tiled_print(&mut self, request: &TiledPrintRequest) -> BridgeResult<PixelBuffer> {
        let ceiling = self.config.image_ceiling;
        let key_bytes = codec::encode_utf8_cstring(request.img_key().as_str())?;
        let request_bytes = codec::encode_json(request)?;
        let mut arena = Arena::new(&mut self.module);

        let key = arena.allocate_with(&key_bytes)?;
        let req = arena.allocate_with(&request_bytes)?;
        let out = arena.allocate(ceiling)?;

        let written = arena.native().create_tiled_print(key.ptr(), req.ptr(), out.ptr());
        arena.release(key);
        arena.release(req);

        if written == 0 {
            return Err(BridgeError::native_failed(
                "create_tiled_print",
                "no image data produced",
            ));
        }
        if written > ceiling {
            return Err(BridgeError::BufferOverflow {
                ceiling,
                len: written,
            });
        }
        codec::raw_bytes_to_transferable(&arena, out, written)
    }
}
