#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use ppp_bridge::native::library::SharedLibrary;
    use ppp_bridge::{
        BridgeConfig, CanvasSpec, ConfigBundle, Dispatcher, PrintStandard, Request, Response,
        TiledPrintRequest, Unit,
    };

    fn other(msg: impl Into<String>) -> io::Error {
        io::Error::new(io::ErrorKind::Other, msg.into())
    }

    /// Parse `HxW<unit>@DPI`, e.g. `45x35mm@300`.
    fn parse_dimensions(spec: &str) -> Option<(f64, f64, Unit, f64)> {
        let (size, dpi) = spec.split_once('@')?;
        let (height, rest) = size.split_once('x')?;
        let split = rest.find(|c: char| c.is_ascii_alphabetic())?;
        let (width, unit) = rest.split_at(split);
        Some((
            height.parse().ok()?,
            width.parse().ok()?,
            Unit::parse(unit)?,
            dpi.parse().ok()?,
        ))
    }

    /// Run one request and return its single response.
    fn roundtrip(dispatcher: &mut Dispatcher<SharedLibrary>, request: Request) -> io::Result<Response> {
        dispatcher.dispatch(request);
        let response = dispatcher
            .take_responses()
            .pop()
            .ok_or_else(|| other("no response emitted"))?;
        match &response {
            Response::Error { kind, message, .. } => Err(other(format!("{}: {}", kind, message))),
            Response::RuntimeFailed { message, .. } => Err(other(message.clone())),
            _ => Ok(response),
        }
    }

    pub fn run() -> io::Result<()> {
        let args: Vec<String> = env::args().collect();
        let mut library_path = String::new();
        let mut config_path = String::new();
        let mut share_dir: Option<PathBuf> = None;
        let mut image_path = String::new();
        let mut out_path = String::from("print.png");
        let mut standard = PrintStandard::default();
        let mut canvas = CanvasSpec::default();
        let mut bridge_config = BridgeConfig::default();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned().unwrap_or_default();
            match args[i].as_str() {
                "--config" => {
                    config_path = value;
                    i += 1;
                }
                "--share" => {
                    share_dir = Some(PathBuf::from(value));
                    i += 1;
                }
                "--image" => {
                    image_path = value;
                    i += 1;
                }
                "--out" => {
                    out_path = value;
                    i += 1;
                }
                "--standard" => {
                    let (height, width, units, resolution) =
                        parse_dimensions(&value).ok_or_else(|| other(format!("Invalid standard: {}", value)))?;
                    standard = PrintStandard { height, width, resolution, units };
                    i += 1;
                }
                "--canvas" => {
                    let (height, width, units, resolution) =
                        parse_dimensions(&value).ok_or_else(|| other(format!("Invalid canvas: {}", value)))?;
                    canvas = CanvasSpec { height, width, resolution, units };
                    i += 1;
                }
                "--bridge" => {
                    bridge_config = BridgeConfig::from_json(&value).map_err(|e| other(e.to_string()))?;
                    i += 1;
                }
                arg if !arg.starts_with("-") => {
                    library_path = arg.to_string();
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        if library_path.is_empty() || config_path.is_empty() || image_path.is_empty() {
            eprintln!(
                "Usage: {} <libppp> --config <config.json> --image <photo> [--share <dir>] [--out <png>] [--standard 45x35mm@300] [--canvas 4x6inch@300] [--bridge <json>]",
                args[0]
            );
            std::process::exit(1);
        }

        println!("ppp-bridge CLI");
        println!("Loading native library: {}", library_path);
        let library = SharedLibrary::load(&library_path).map_err(|e| other(e.to_string()))?;

        let share_dir = share_dir.unwrap_or_else(|| {
            Path::new(&config_path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        });
        let config_text = fs::read_to_string(&config_path)?;
        let bundle = ConfigBundle::from_json(&config_text)
            .and_then(|b| b.embed_from_dir(&share_dir))
            .map_err(|e| other(e.to_string()))?;

        let mut dispatcher =
            Dispatcher::new(library, bridge_config).map_err(|e| other(e.to_string()))?;
        roundtrip(&mut dispatcher, Request::Configure { config: bundle })?;
        println!("Native module configured.");

        let image = fs::read(&image_path)?;
        println!("Uploading {} ({} bytes)", image_path, image.len());
        let img_key = match roundtrip(&mut dispatcher, Request::SetImage { image_data: image.into() })? {
            Response::ImageSet { img_key, .. } => img_key,
            other_response => return Err(other(format!("unexpected {}", other_response.cmd()))),
        };

        let landmarks = match roundtrip(&mut dispatcher, Request::DetectLandmarks { img_key: img_key.clone() })? {
            Response::LandmarksDetected { landmarks, .. } => landmarks,
            other_response => return Err(other(format!("unexpected {}", other_response.cmd()))),
        };
        if let Some(msg) = &landmarks.error_msg {
            return Err(other(format!("Landmark detection failed: {}", msg)));
        }
        println!(
            "Crown {:?}, chin {:?}",
            landmarks.crown_point, landmarks.chin_point
        );

        let request = TiledPrintRequest::new(img_key, standard, canvas, landmarks);
        let png = match roundtrip(&mut dispatcher, Request::CreateTiledPrint { request })? {
            Response::TiledPrintCreated { png_data, .. } => png_data,
            other_response => return Err(other(format!("unexpected {}", other_response.cmd()))),
        };

        fs::write(&out_path, png.as_bytes())?;
        println!("Wrote {} ({} bytes)", out_path, png.len());
        Ok(())
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::io::Result<()> {
    cli::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
