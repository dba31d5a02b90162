mod common;

use common::*;
use ppp_bridge::{
    Arena, BridgeConfig, BridgeError, CanvasSpec, CommandKind, ConfigBundle, DispatchState,
    Dispatcher, ImageKey, LandmarkPair, PixelBuffer, Point, PrintStandard, Readiness, Request,
    Response, TiledPrintRequest, Unit,
};
use serde_json::json;

fn jpeg() -> PixelBuffer {
    PixelBuffer::from(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46])
}

fn set_image(d: &mut Dispatcher<ScriptedModule>) -> ImageKey {
    match one(d, Request::SetImage { image_data: jpeg() }) {
        Response::ImageSet { img_key, .. } => img_key,
        other => panic!("unexpected response {:?}", other),
    }
}

fn detect(d: &mut Dispatcher<ScriptedModule>, img_key: &ImageKey) -> LandmarkPair {
    match one(d, Request::DetectLandmarks { img_key: img_key.clone() }) {
        Response::LandmarksDetected { landmarks, .. } => landmarks,
        other => panic!("unexpected response {:?}", other),
    }
}

fn print_request(img_key: ImageKey, landmarks: LandmarkPair) -> TiledPrintRequest {
    TiledPrintRequest::new(img_key, PrintStandard::default(), CanvasSpec::default(), landmarks)
}

#[test]
fn test_end_to_end_session() {
    let mut d = configured();
    let key = set_image(&mut d);
    assert_eq!(d.module().images[key.as_str()], jpeg().into_inner());

    let landmarks = detect(&mut d, &key);
    assert!(landmarks.is_detected());
    assert_eq!(landmarks.crown_point, Some(Point::new(120.0, 40.0)));

    let response = one(
        &mut d,
        Request::CreateTiledPrint {
            request: print_request(key, landmarks),
        },
    );
    match response {
        Response::TiledPrintCreated { png_data, .. } => assert_eq!(png_data.as_bytes(), PNG),
        other => panic!("unexpected response {:?}", other),
    }

    assert_eq!(
        d.module().calls,
        vec!["configure", "set_image", "detect_landmarks", "create_tiled_print"]
    );
    assert_heap_balanced(&d);
    assert_eq!(d.state(), DispatchState::Idle);
}

#[test]
fn test_configure_payload_reaches_module() {
    let d = configured();
    let seen = d.module().config.clone().expect("module saw no configuration");
    assert_eq!(seen["shapePredictor"]["data"], "AAEC");
    assert_eq!(seen["eyesDetector"]["useHaarCascade"], false);
    assert_heap_balanced(&d);
}

#[test]
fn test_every_allocation_released_after_each_response() {
    let mut d = configured();
    assert_heap_balanced(&d);

    let key = set_image(&mut d);
    assert_heap_balanced(&d);

    let landmarks = detect(&mut d, &key);
    assert_heap_balanced(&d);

    one(
        &mut d,
        Request::CreateTiledPrint {
            request: print_request(key.clone(), landmarks),
        },
    );
    assert_heap_balanced(&d);

    // Failures release as well
    one(&mut d, Request::SetImage { image_data: PixelBuffer::default() });
    assert_heap_balanced(&d);
    one(&mut d, Request::DetectLandmarks { img_key: ImageKey::new("nope") });
    assert_heap_balanced(&d);
}

#[test]
fn test_release_is_idempotent() {
    let mut module = ScriptedModule::new(4096);
    {
        let mut arena = Arena::new(&mut module);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();

        arena.release(a);
        arena.release(a);
        assert_eq!(arena.live_count(), 1);

        // Dropping the arena must not free `a` again
        let _ = b;
    }

    let stats = module.heap.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.frees, 2);
    assert_eq!(stats.invalid_frees, 0);
}

#[test]
fn test_responses_follow_submission_order() {
    let mut d = configured();
    let r1 = d.submit(Request::SetImage { image_data: jpeg() });
    let r2 = d.submit(Request::DetectLandmarks {
        img_key: ImageKey::new("img0"),
    });
    assert_eq!(d.pending(), 2);
    assert_eq!(d.pump(), 2);

    let responses = d.take_responses();
    let seqs: Vec<u32> = responses.iter().map(Response::seq).collect();
    assert_eq!(seqs, vec![r1, r2]);

    // R2 saw the image R1 stored, so R1 ran to completion first
    assert!(matches!(responses[0], Response::ImageSet { .. }));
    match &responses[1] {
        Response::LandmarksDetected { landmarks, .. } => assert!(landmarks.is_detected()),
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn test_requests_before_configure_never_reach_module() {
    let mut d = dispatcher();

    let requests = vec![
        Request::SetImage { image_data: jpeg() },
        Request::DetectLandmarks { img_key: ImageKey::new("img0") },
        Request::CreateTiledPrint {
            request: print_request(
                ImageKey::new("img0"),
                LandmarkPair::detected(Point::new(0.0, 0.0), Point::new(0.0, 10.0)),
            ),
        },
    ];
    for request in requests {
        let kind = request.kind();
        let response = one(&mut d, request);
        assert_eq!(error_kind(&response), "NotConfigured");
        match response {
            Response::Error { request, .. } => assert_eq!(request, kind),
            _ => unreachable!(),
        }
    }

    assert!(d.module().calls.is_empty());
    assert_eq!(d.module().heap.stats().allocations, 0);
    assert_eq!(d.stats().rejected, 3);
    assert_eq!(d.readiness(), Readiness::Pending);
}

#[test]
fn test_zero_length_print_is_native_failure() {
    let mut d = configured();
    let key = set_image(&mut d);
    let landmarks = detect(&mut d, &key);
    d.module_mut().print_length = Some(0);

    let response = one(
        &mut d,
        Request::CreateTiledPrint {
            request: print_request(key, landmarks),
        },
    );
    assert_eq!(error_kind(&response), "NativeOperationFailed");
    assert_heap_balanced(&d);
    assert_eq!(d.state(), DispatchState::Idle);
}

#[test]
fn test_print_longer_than_ceiling_overflows() {
    let mut d = configured();
    let key = set_image(&mut d);
    let landmarks = detect(&mut d, &key);
    let ceiling = d.config().image_ceiling;
    d.module_mut().print_length = Some(ceiling + 1);

    let response = one(
        &mut d,
        Request::CreateTiledPrint {
            request: print_request(key, landmarks),
        },
    );
    assert_eq!(error_kind(&response), "BufferOverflow");
    assert_heap_balanced(&d);
}

#[test]
fn test_print_filling_ceiling_exactly_is_accepted() {
    let mut d = configured();
    let key = set_image(&mut d);
    let landmarks = detect(&mut d, &key);
    let ceiling = d.config().image_ceiling;
    d.module_mut().print_length = Some(ceiling);

    let response = one(
        &mut d,
        Request::CreateTiledPrint {
            request: print_request(key, landmarks),
        },
    );
    match response {
        Response::TiledPrintCreated { png_data, .. } => assert_eq!(png_data.len(), ceiling),
        other => panic!("unexpected response {:?}", other),
    }
    assert_heap_balanced(&d);
}

#[test]
fn test_oversized_landmark_output_is_malformed() {
    let mut d = configured();
    let key = set_image(&mut d);
    let ceiling = d.config().landmark_ceiling;
    d.module_mut()
        .detection
        .insert(key.as_str().to_string(), Detection::Oversized(ceiling * 2));

    let response = one(&mut d, Request::DetectLandmarks { img_key: key });
    assert_eq!(error_kind(&response), "MalformedResponse");
    assert_heap_balanced(&d);
}

#[test]
fn test_unterminated_landmark_output_is_malformed() {
    let mut d = configured();
    let key = set_image(&mut d);
    d.module_mut()
        .detection
        .insert(key.as_str().to_string(), Detection::Unterminated);

    // The text would parse, but the region was filled to the last byte
    let response = one(&mut d, Request::DetectLandmarks { img_key: key });
    assert_eq!(error_kind(&response), "MalformedResponse");
    assert_heap_balanced(&d);
}

#[test]
fn test_no_face_is_reported_in_landmarks() {
    let mut d = configured();
    let key = set_image(&mut d);
    d.module_mut()
        .detection
        .insert(key.as_str().to_string(), Detection::NoFace("No face found".to_string()));

    let landmarks = detect(&mut d, &key);
    assert!(!landmarks.is_detected());
    assert_eq!(landmarks.error_msg.as_deref(), Some("No face found"));
    assert_eq!(landmarks.crown_point, None);
}

#[test]
fn test_silent_detection_failure_gets_message() {
    let mut d = configured();
    let key = set_image(&mut d);
    d.module_mut()
        .detection
        .insert(key.as_str().to_string(), Detection::Silent);

    let landmarks = detect(&mut d, &key);
    assert!(!landmarks.is_detected());
    assert!(landmarks.error_msg.unwrap().contains(key.as_str()));
}

#[test]
fn test_tiled_print_request_reaches_module_intact() {
    let mut d = configured();
    let key = set_image(&mut d);
    let landmarks = LandmarkPair::detected(Point::new(101.5, 33.25), Point::new(99.0, 412.75));
    let standard = PrintStandard {
        height: 2.0,
        width: 2.0,
        resolution: 600.0,
        units: Unit::Inch,
    };
    let canvas = CanvasSpec {
        height: 1800.0,
        width: 1200.0,
        resolution: 300.0,
        units: Unit::Pixel,
    };
    let request = TiledPrintRequest::new(key, standard, canvas, landmarks);

    let response = one(&mut d, Request::CreateTiledPrint { request: request.clone() });
    assert!(matches!(response, Response::TiledPrintCreated { .. }));
    assert_eq!(d.module().print_requests, vec![request]);
}

#[test]
fn test_failure_does_not_poison_later_requests() {
    let mut d = configured();

    let failed = one(&mut d, Request::SetImage { image_data: PixelBuffer::default() });
    assert_eq!(error_kind(&failed), "NativeOperationFailed");
    assert_eq!(d.state(), DispatchState::Idle);

    let key = set_image(&mut d);
    let landmarks = detect(&mut d, &key);
    assert!(landmarks.is_detected());

    let stats = d.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rejected, 0);
    assert_heap_balanced(&d);
}

#[test]
fn test_failed_configure_leaves_bridge_unready() {
    let mut d = dispatcher();
    d.module_mut().accept_config = false;

    match one(&mut d, Request::Configure { config: bundle() }) {
        Response::RuntimeFailed { message, .. } => assert!(message.contains("configure")),
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(d.readiness(), Readiness::Failed);

    let response = one(&mut d, Request::SetImage { image_data: jpeg() });
    assert_eq!(error_kind(&response), "NotConfigured");

    // A retry is refused; readiness never recovers
    d.module_mut().accept_config = true;
    let retry = one(&mut d, Request::Configure { config: bundle() });
    assert_eq!(error_kind(&retry), "AlreadyConfigured");
    assert!(!d.is_ready());

    assert_eq!(d.module().calls, vec!["configure"]);
    assert_heap_balanced(&d);
}

#[test]
fn test_out_of_memory_is_typed() {
    let mut d = Dispatcher::new(ScriptedModule::new(2048), small_config()).unwrap();
    d.dispatch(Request::Configure { config: bundle() });
    assert!(d.is_ready());
    d.take_responses();

    let response = one(
        &mut d,
        Request::SetImage {
            image_data: PixelBuffer::from(vec![0u8; 4096]),
        },
    );
    assert_eq!(error_kind(&response), "OutOfMemory");
    assert!(d.module().calls.iter().all(|&c| c != "set_image"));
    assert_heap_balanced(&d);
}

#[test]
fn test_unterminated_image_key_overflows() {
    let mut d = configured();
    let ceiling = d.config().key_ceiling;
    d.module_mut().forced_key = Some(vec![b'k'; ceiling]);

    let response = one(&mut d, Request::SetImage { image_data: jpeg() });
    assert_eq!(error_kind(&response), "BufferOverflow");
    assert_heap_balanced(&d);
}

#[test]
fn test_longest_image_key_is_accepted() {
    let mut d = configured();
    let ceiling = d.config().key_ceiling;
    let mut key = vec![b'k'; ceiling - 1];
    key.push(0);
    d.module_mut().forced_key = Some(key);

    match one(&mut d, Request::SetImage { image_data: jpeg() }) {
        Response::ImageSet { img_key, .. } => {
            assert_eq!(img_key.as_str(), "k".repeat(ceiling - 1))
        }
        other => panic!("unexpected response {:?}", other),
    }
    assert_heap_balanced(&d);
}

#[test]
fn test_invalid_config_is_refused() {
    let config = BridgeConfig {
        key_ceiling: 0,
        ..small_config()
    };
    let err = Dispatcher::new(ScriptedModule::new(1024), config).err().unwrap();
    assert!(matches!(err, BridgeError::Config(_)));
}

#[test]
fn test_empty_image_key_is_native_failure() {
    let mut d = configured();
    d.module_mut().forced_key = Some(vec![0]);

    let response = one(&mut d, Request::SetImage { image_data: jpeg() });
    assert_eq!(error_kind(&response), "NativeOperationFailed");
}

#[test]
fn test_interior_nul_key_rejected_locally() {
    let mut d = configured();
    let response = one(&mut d, Request::DetectLandmarks { img_key: ImageKey::new("im\0g") });

    assert_eq!(error_kind(&response), "InteriorNul");
    assert_eq!(d.module().calls, vec!["configure"]);
    assert_eq!(d.stats().rejected, 1);
}

#[test]
fn test_error_response_wire_shape() {
    let mut d = dispatcher();
    let response = one(&mut d, Request::DetectLandmarks { img_key: ImageKey::new("k") });

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["cmd"], "onError");
    assert_eq!(value["request"], "detectLandmarks");
    assert_eq!(value["kind"], "NotConfigured");
    assert_eq!(value["seq"], 0);
}

#[test]
fn test_requests_decode_from_ui_messages() {
    let message = json!({"cmd": "detectLandmarks", "imgKey": "img0"});
    let request: Request = serde_json::from_value(message).unwrap();
    assert_eq!(request.kind(), CommandKind::DetectLandmarks);

    let message = json!({
        "cmd": "configure",
        "config": {"shapePredictor": {"file": "sp.dat"}}
    });
    let request: Request = serde_json::from_value(message).unwrap();
    match request {
        Request::Configure { config } => {
            assert_eq!(config.as_value()["shapePredictor"]["file"], "sp.dat")
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[test]
fn test_embedded_bundle_is_base64() {
    let bundle = ConfigBundle::from_value(json!({
        "faceDetector": {"file": "face.dat"},
        "shapePredictor": {"file": "sp.dat", "data": "keep"}
    }))
    .unwrap()
    .embed_files(|name| match name {
        "face.dat" => Ok(vec![1, 2, 3]),
        other => Err(BridgeError::Config(format!("unexpected file {}", other))),
    })
    .unwrap();

    assert_eq!(bundle.as_value()["faceDetector"]["data"], "AQID");
    assert_eq!(bundle.as_value()["shapePredictor"]["data"], "keep");

    // The embedded bundle still configures the module
    let mut d = dispatcher();
    assert!(matches!(
        one(&mut d, Request::Configure { config: bundle }),
        Response::RuntimeInitialized { .. }
    ));
    assert_eq!(d.module().config.as_ref().unwrap()["faceDetector"]["data"], "AQID");
}

#[test]
fn test_heap_is_reusable_across_many_requests() {
    let mut d = configured();
    for _ in 0..100 {
        let key = set_image(&mut d);
        detect(&mut d, &key);
    }
    assert_heap_balanced(&d);
}
