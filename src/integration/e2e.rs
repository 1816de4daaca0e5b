//! End-to-end tests through the router

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

use crate::config::{LimitsConfig, ServerConfig};
use crate::http::create_router;
use crate::http::error_body::{ErrorBody, ERROR_TITLE};
use crate::integration::fixtures::{
    dir_entries, invocations, multipart_request, wav_file, Part,
};
use crate::state::AppState;
use crate::transcode::FfmpegEngine;
use crate::upload::AUDIO_FIELD;

/// A router wired to private staging directories
struct TestApp {
    scratch: TempDir,
    upload_dir: TempDir,
    convert_dir: TempDir,
    router: Router,
}

impl TestApp {
    fn new(engine: FfmpegEngine, limits: LimitsConfig) -> Self {
        let scratch = TempDir::new().unwrap();
        Self::with_scratch(scratch, engine, limits)
    }

    fn with_scratch(scratch: TempDir, engine: FfmpegEngine, limits: LimitsConfig) -> Self {
        let upload_dir = TempDir::new().unwrap();
        let convert_dir = TempDir::new().unwrap();

        let mut config = ServerConfig::default();
        config.storage.upload_dir = upload_dir.path().to_path_buf();
        config.storage.convert_dir = convert_dir.path().to_path_buf();
        config.limits = limits;

        let router = create_router(Arc::new(AppState::new(config, engine)));
        Self {
            scratch,
            upload_dir,
            convert_dir,
            router,
        }
    }

    #[cfg(unix)]
    fn fake(behaviour: crate::integration::fixtures::FakeEngine) -> Self {
        Self::fake_with_limits(behaviour, LimitsConfig::default())
    }

    #[cfg(unix)]
    fn fake_with_limits(
        behaviour: crate::integration::fixtures::FakeEngine,
        limits: LimitsConfig,
    ) -> Self {
        let scratch = TempDir::new().unwrap();
        let script = crate::integration::fixtures::fake_engine(scratch.path(), behaviour);
        Self::with_scratch(scratch, FfmpegEngine::new(script, "warning"), limits)
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    fn engine_runs(&self) -> Vec<String> {
        invocations(self.scratch.path())
    }

    fn assert_staging_empty(&self) {
        assert_eq!(dir_entries(self.upload_dir.path()), 0, "upload dir not empty");
        assert_eq!(dir_entries(self.convert_dir.path()), 0, "convert dir not empty");
    }
}

fn song_upload() -> Vec<Part> {
    vec![Part::file(AUDIO_FIELD, "song.wav", wav_file(8000))]
}

async fn error_body(response: Response<Body>) -> ErrorBody {
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.errors.len(), 1);
    assert_eq!(body.errors[0].status, 400);
    assert_eq!(body.errors[0].code, "400");
    assert_eq!(body.errors[0].title, ERROR_TITLE);
    body
}

/// Value after `-i` and the last argument of a recorded engine run
fn input_and_output(run: &str) -> (String, String) {
    let args: Vec<&str> = run.split_whitespace().collect();
    let input = args
        .iter()
        .position(|a| *a == "-i")
        .map(|i| args[i + 1].to_string())
        .unwrap();
    (input, args.last().unwrap().to_string())
}

#[tokio::test]
async fn test_unsupported_format_rejected_before_io() {
    // An engine that cannot run proves the request never got that far.
    let app = TestApp::new(
        FfmpegEngine::new("nonexistent_ffmpeg_xyz_12345", "warning"),
        LimitsConfig::default(),
    );

    for format in ["ogg", "wav", "WAV", "mp4", "flac2", "m4a"] {
        let response = app
            .send(multipart_request(&format!("/convert/{}", format), &song_upload()))
            .await;
        let body = error_body(response).await;
        assert_eq!(
            body.errors[0].detail,
            format!("{} is not a supported audio format", format)
        );
        app.assert_staging_empty();
    }
}

#[tokio::test]
async fn test_missing_audio_field() {
    let app = TestApp::new(
        FfmpegEngine::new("nonexistent_ffmpeg_xyz_12345", "warning"),
        LimitsConfig::default(),
    );

    let parts = vec![
        Part::text("comment", "no audio here"),
        Part::file("file", "song.wav", wav_file(100)),
    ];
    let response = app.send(multipart_request("/convert/mp3", &parts)).await;
    let body = error_body(response).await;

    assert!(body.errors[0].detail.contains("error retrieving the audio file"));
    assert!(body.errors[0].detail.contains(AUDIO_FIELD));
    app.assert_staging_empty();
}

#[tokio::test]
async fn test_body_that_is_not_multipart() {
    let app = TestApp::new(
        FfmpegEngine::new("nonexistent_ffmpeg_xyz_12345", "warning"),
        LimitsConfig::default(),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/convert/flac")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let body = error_body(app.send(request).await).await;

    assert!(body.errors[0].detail.contains("error retrieving the audio file"));
    app.assert_staging_empty();
}

#[cfg(unix)]
mod with_fake_engine {
    use super::*;
    use crate::integration::fixtures::{FakeEngine, FAKE_OUTPUT};

    #[tokio::test]
    async fn test_supported_formats_any_case() {
        let app = TestApp::fake(FakeEngine::Succeed);

        for (requested, format) in [("aac", "aac"), ("FLAC", "flac"), ("Mp3", "mp3")] {
            let response = app
                .send(multipart_request(&format!("/convert/{}", requested), &song_upload()))
                .await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE).unwrap(),
                &format!("audio/{}", format)
            );
            assert_eq!(
                response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
                &format!("attachment; filename=song.{}", format)
            );
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], FAKE_OUTPUT);
            app.assert_staging_empty();
        }

        let runs = app.engine_runs();
        assert_eq!(runs.len(), 3);
        assert!(runs[0].contains("-c:a aac -f adts"));
        assert!(runs[1].contains("-c:a flac -f flac"));
        assert!(runs[2].contains("-c:a libmp3lame -f mp3"));
    }

    #[tokio::test]
    async fn test_engine_failure_is_structured_error() {
        let app = TestApp::fake(FakeEngine::Fail);

        let response = app
            .send(multipart_request("/convert/mp3", &song_upload()))
            .await;
        let body = error_body(response).await;

        let detail = &body.errors[0].detail;
        assert!(detail.starts_with("could not convert the uploaded audio file"));
        assert!(detail.contains("exited with"));
        // ffmpeg's own output stays in the server log.
        assert!(!detail.contains("Invalid data found"));
        assert!(!detail.contains("[error]"));
        assert!(!detail.contains(app.upload_dir.path().to_str().unwrap()));
        assert_eq!(app.engine_runs().len(), 1);
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_audio_field_that_is_not_a_file() {
        let app = TestApp::fake(FakeEngine::Succeed);

        let parts = vec![Part::text(AUDIO_FIELD, "not a file upload")];
        let response = app.send(multipart_request("/convert/mp3", &parts)).await;
        let body = error_body(response).await;

        assert!(body.errors[0].detail.contains("error retrieving the audio file"));
        assert!(body.errors[0].detail.contains("is not a file upload"));
        assert!(app.engine_runs().is_empty());
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_cancelled_request_cleans_up() {
        let app = TestApp::fake(FakeEngine::Hang);

        let router = app.router.clone();
        let handle = tokio::spawn(async move {
            router
                .oneshot(multipart_request("/convert/flac", &song_upload()))
                .await
        });

        // Wait until ffmpeg is running with both temp files in place.
        let mut waited = 0;
        while app.engine_runs().is_empty() {
            assert!(waited < 500, "engine never started");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(dir_entries(app.upload_dir.path()), 1);
        assert_eq!(dir_entries(app.convert_dir.path()), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_empty_engine_output_is_structured_error() {
        let app = TestApp::fake(FakeEngine::Empty);

        let response = app
            .send(multipart_request("/convert/aac", &song_upload()))
            .await;
        let body = error_body(response).await;

        assert!(body.errors[0].detail.contains("empty file"));
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_upload_size_boundary() {
        let app = TestApp::fake(FakeEngine::Succeed);
        let limit = LimitsConfig::default().max_upload_bytes as usize;

        let exact = vec![Part::file(AUDIO_FIELD, "big.wav", vec![0x11; limit])];
        let response = app.send(multipart_request("/convert/flac", &exact)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.engine_runs().len(), 1);

        let over = vec![Part::file(AUDIO_FIELD, "big.wav", vec![0x11; limit + 1])];
        let response = app.send(multipart_request("/convert/flac", &over)).await;
        let body = error_body(response).await;
        assert!(body.errors[0]
            .detail
            .contains(&format!("exceeds the limit of {} bytes", limit)));

        // The engine was not run a second time.
        assert_eq!(app.engine_runs().len(), 1);
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_body_far_over_limit() {
        let limits = LimitsConfig {
            max_upload_bytes: 1024,
            ..Default::default()
        };
        let app = TestApp::fake_with_limits(FakeEngine::Succeed, limits);

        // Larger than the whole-body limit, so the HTTP layer stops reading.
        let parts = vec![Part::file(AUDIO_FIELD, "big.wav", vec![0; 256 * 1024])];
        let body = error_body(app.send(multipart_request("/convert/mp3", &parts)).await).await;

        assert!(body.errors[0].detail.contains("exceeds the limit of 1024 bytes"));
        assert!(app.engine_runs().is_empty());
        app.assert_staging_empty();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_use_distinct_files() {
        let app = TestApp::fake(FakeEngine::Succeed);

        let mut handles = Vec::new();
        for i in 0..16 {
            let router = app.router.clone();
            let format = ["aac", "flac", "mp3"][i % 3];
            handles.push(tokio::spawn(async move {
                router
                    .oneshot(multipart_request(&format!("/convert/{}", format), &song_upload()))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().status(), StatusCode::OK);
        }

        let runs = app.engine_runs();
        assert_eq!(runs.len(), 16);
        let mut inputs = HashSet::new();
        let mut outputs = HashSet::new();
        for run in &runs {
            let (input, output) = input_and_output(run);
            assert!(Path::new(&input).starts_with(app.upload_dir.path()));
            assert!(Path::new(&output).starts_with(app.convert_dir.path()));
            inputs.insert(input);
            outputs.insert(output);
        }
        assert_eq!(inputs.len(), 16);
        assert_eq!(outputs.len(), 16);
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_over_tcp() {
        let app = TestApp::fake(FakeEngine::Succeed);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = reqwest::Client::new();
        let form = reqwest::multipart::Form::new().part(
            AUDIO_FIELD,
            reqwest::multipart::Part::bytes(wav_file(400)).file_name("voice memo.wav"),
        );
        let response = client
            .post(format!("http://{}/convert/mp3", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers().get("content-type").unwrap(), "audio/mp3");
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment; filename=voice memo.mp3"
        );
        assert_eq!(&response.bytes().await.unwrap()[..], FAKE_OUTPUT);

        let form = reqwest::multipart::Form::new().part(
            AUDIO_FIELD,
            reqwest::multipart::Part::bytes(wav_file(400)).file_name("song.wav"),
        );
        let response = client
            .post(format!("http://{}/convert/opus", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: ErrorBody = response.json().await.unwrap();
        assert_eq!(body.errors[0].detail, "opus is not a supported audio format");

        app.assert_staging_empty();
    }
}

/// Tests against a real ffmpeg; they return early when none is installed.
mod with_ffmpeg {
    use super::*;
    use crate::config::EngineConfig;

    fn real_engine() -> Option<FfmpegEngine> {
        FfmpegEngine::discover(&EngineConfig::default()).ok()
    }

    #[tokio::test]
    async fn test_wav_to_flac() {
        let Some(engine) = real_engine() else {
            return;
        };
        let app = TestApp::new(engine, LimitsConfig::default());

        let response = app
            .send(multipart_request("/convert/flac", &song_upload()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/flac"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=song.flac"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[..4], b"fLaC");
        app.assert_staging_empty();
    }

    #[tokio::test]
    async fn test_garbage_input() {
        let Some(engine) = real_engine() else {
            return;
        };
        let app = TestApp::new(engine, LimitsConfig::default());

        let parts = vec![Part::file(AUDIO_FIELD, "noise.wav", b"definitely not audio".to_vec())];
        let response = app.send(multipart_request("/convert/flac", &parts)).await;
        let body = error_body(response).await;

        assert!(body.errors[0]
            .detail
            .starts_with("could not convert the uploaded audio file"));
        app.assert_staging_empty();
    }
}
