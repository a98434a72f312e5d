use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use neutts_rs::device::Device;
use neutts_rs::handle::ModelHandle;
use neutts_rs::language::Language;
use neutts_rs::phonemizer::{Phonemizer, PhonemizerError, PhonemizerProvider};
use neutts_rs::server::{router, AppState};
use neutts_rs::{BoxError, ReferenceCodes, SynthesisResult, VoiceCloneModel, OUTPUT_SAMPLE_RATE};

struct FixedPhonemizer(String);

impl Phonemizer for FixedPhonemizer {
    fn language(&self) -> &str {
        &self.0
    }

    fn phonemize(&self, text: &str) -> Result<String, PhonemizerError> {
        Ok(text.to_string())
    }
}

#[derive(Default)]
struct FakeProvider {
    builds: AtomicUsize,
    fail: bool,
}

impl PhonemizerProvider for FakeProvider {
    fn build(&self, language: Language) -> Result<Box<dyn Phonemizer>, PhonemizerError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PhonemizerError::EspeakNotFound);
        }
        Ok(Box::new(FixedPhonemizer(language.espeak_code().to_string())))
    }
}

#[derive(Default)]
struct Recorder {
    phonemizer: Option<String>,
    encode_calls: usize,
    infer_calls: usize,
}

struct FakeModel {
    recorder: Arc<Mutex<Recorder>>,
    infer_error: Option<&'static str>,
    gate: Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>,
}

impl FakeModel {
    fn new(recorder: Arc<Mutex<Recorder>>) -> Self {
        Self {
            recorder,
            infer_error: None,
            gate: None,
        }
    }
}

impl VoiceCloneModel for FakeModel {
    fn set_phonemizer(&mut self, phonemizer: Box<dyn Phonemizer>) {
        self.recorder.lock().unwrap().phonemizer = Some(phonemizer.language().to_string());
    }

    fn encode_reference(&mut self, _audio_path: &Path) -> Result<ReferenceCodes, BoxError> {
        self.recorder.lock().unwrap().encode_calls += 1;
        if let Some((entered, release)) = &self.gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        Ok(ReferenceCodes(vec![10, 20, 30]))
    }

    fn infer(
        &mut self,
        _text: &str,
        _reference: &ReferenceCodes,
        _reference_text: &str,
    ) -> Result<SynthesisResult, BoxError> {
        self.recorder.lock().unwrap().infer_calls += 1;
        if let Some(message) = self.infer_error {
            return Err(message.into());
        }
        Ok(SynthesisResult {
            samples: (0..2400).map(|i| (i as f32 / 100.0).sin() * 0.3).collect(),
            sample_rate: OUTPUT_SAMPLE_RATE,
        })
    }
}

fn reference_wav() -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
    for i in 0..1600 {
        writer.write_sample((i % 64) as i16 * 100).unwrap();
    }
    writer.finalize().unwrap();
    file
}

fn loaded_state(model: FakeModel, provider: Arc<FakeProvider>) -> Arc<AppState> {
    let state = AppState::new(Device::Cpu, false);
    assert!(state.install_model(ModelHandle::new(
        Box::new(model),
        Language::INITIAL,
        provider,
    )));
    Arc::new(state)
}

fn tts_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/tts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn detail(body: &[u8]) -> String {
    let json: serde_json::Value = serde_json::from_slice(body).unwrap();
    json["detail"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn tts_before_model_load_is_unavailable() {
    let reference = reference_wav();
    let app = router(Arc::new(AppState::new(Device::Cpu, false)));

    let (status, _, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Hello world",
            "reference_audio_path": reference.path(),
        })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(detail(&body), "TTS Model not initialized");
}

#[tokio::test]
async fn health_reports_model_state() {
    let state = Arc::new(AppState::new(Device::Cpu, false));
    let app = router(state.clone());
    let health = || Request::get("/health").body(Body::empty()).unwrap();

    let (status, _, body) = send(app.clone(), health()).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["cuda_available"], false);

    let recorder = Arc::new(Mutex::new(Recorder::default()));
    state.install_model(ModelHandle::new(
        Box::new(FakeModel::new(recorder)),
        Language::INITIAL,
        Arc::new(FakeProvider::default()),
    ));

    let (_, _, body) = send(app, health()).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["model_loaded"], true);
}

#[tokio::test]
async fn missing_reference_is_rejected_before_inference() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let app = router(loaded_state(
        FakeModel::new(recorder.clone()),
        Arc::new(FakeProvider::default()),
    ));

    let (status, _, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Hello world",
            "reference_audio_path": "/nonexistent",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(detail(&body).contains("/nonexistent"));
    let recorder = recorder.lock().unwrap();
    assert_eq!(recorder.encode_calls, 0);
    assert_eq!(recorder.infer_calls, 0);
}

#[tokio::test]
async fn english_request_returns_24k_wav() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let provider = Arc::new(FakeProvider::default());
    let app = router(loaded_state(FakeModel::new(recorder.clone()), provider.clone()));

    let (status, headers, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Hello world",
            "reference_audio_path": reference.path(),
            "language": "en",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("output.wav"));

    let reader = hound::WavReader::new(Cursor::new(body)).unwrap();
    assert_eq!(reader.spec().sample_rate, 24000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len(), 2400);

    // Already English: no phonemizer rebuild.
    assert_eq!(provider.builds.load(Ordering::SeqCst), 0);
    let recorder = recorder.lock().unwrap();
    assert_eq!((recorder.encode_calls, recorder.infer_calls), (1, 1));
}

#[tokio::test]
async fn mandarin_switches_phonemizer_once() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let provider = Arc::new(FakeProvider::default());
    let app = router(loaded_state(FakeModel::new(recorder.clone()), provider.clone()));

    for _ in 0..2 {
        let (status, _, _) = send(
            app.clone(),
            tts_request(serde_json::json!({
                "text": "你好",
                "reference_audio_path": reference.path(),
                "language": "zh",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(provider.builds.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.lock().unwrap().phonemizer.as_deref(), Some("cmn"));
}

#[tokio::test]
async fn language_defaults_to_mandarin() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let app = router(loaded_state(
        FakeModel::new(recorder.clone()),
        Arc::new(FakeProvider::default()),
    ));

    let (status, _, _) = send(
        app,
        tts_request(serde_json::json!({
            "text": "你好",
            "reference_audio_path": reference.path(),
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(recorder.lock().unwrap().phonemizer.as_deref(), Some("cmn"));
}

#[tokio::test]
async fn unknown_language_falls_back_to_english() {
    let reference = reference_wav();
    let provider = Arc::new(FakeProvider::default());
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let app = router(loaded_state(FakeModel::new(recorder), provider.clone()));

    let (status, _, _) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Bonjour",
            "reference_audio_path": reference.path(),
            "language": "fr",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(provider.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn strict_mode_rejects_unknown_language() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let state = AppState::new(Device::Cpu, false).with_strict_language(true);
    state.install_model(ModelHandle::new(
        Box::new(FakeModel::new(recorder.clone())),
        Language::INITIAL,
        Arc::new(FakeProvider::default()),
    ));
    let app = router(Arc::new(state));

    let (status, _, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Bonjour",
            "reference_audio_path": reference.path(),
            "language": "fr",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(detail(&body).contains("fr"));
    assert_eq!(recorder.lock().unwrap().infer_calls, 0);
}

#[tokio::test]
async fn failed_phonemizer_switch_still_synthesizes() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let provider = Arc::new(FakeProvider {
        fail: true,
        ..Default::default()
    });
    let app = router(loaded_state(FakeModel::new(recorder.clone()), provider.clone()));

    let (status, headers, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "你好",
            "reference_audio_path": reference.path(),
            "language": "zh",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert!(hound::WavReader::new(Cursor::new(body)).is_ok());
    assert_eq!(provider.builds.load(Ordering::SeqCst), 1);
    assert!(recorder.lock().unwrap().phonemizer.is_none());
}

#[tokio::test]
async fn model_failure_is_internal_error_with_message() {
    let reference = reference_wav();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let model = FakeModel {
        infer_error: Some("backbone produced no speech tokens"),
        ..FakeModel::new(recorder)
    };
    let app = router(loaded_state(model, Arc::new(FakeProvider::default())));

    let (status, _, body) = send(
        app,
        tts_request(serde_json::json!({
            "text": "Hello",
            "reference_audio_path": reference.path(),
            "language": "en",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(detail(&body), "backbone produced no speech tokens");
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let app = router(loaded_state(
        FakeModel::new(recorder.clone()),
        Arc::new(FakeProvider::default()),
    ));

    let (status, _, body) = send(
        app,
        tts_request(serde_json::json!({ "reference_audio_path": "/tmp/ref.wav" })),
    )
    .await;

    assert!(status.is_client_error(), "status {status}");
    assert!(detail(&body).contains("text"));
    assert_eq!(recorder.lock().unwrap().encode_calls, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_queue_is_rejected() {
    let reference = reference_wav();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let model = FakeModel {
        gate: Some((entered_tx, release_rx)),
        ..FakeModel::new(recorder)
    };

    let state = AppState::new(Device::Cpu, false).with_max_pending(1);
    state.install_model(ModelHandle::new(
        Box::new(model),
        Language::INITIAL,
        Arc::new(FakeProvider::default()),
    ));
    let app = router(Arc::new(state));
    let body = serde_json::json!({
        "text": "Hello",
        "reference_audio_path": reference.path(),
        "language": "en",
    });

    let first = tokio::spawn(send(app.clone(), tts_request(body.clone())));
    tokio::task::spawn_blocking(move || entered_rx.recv().unwrap())
        .await
        .unwrap();

    let (status, _, busy_body) = send(app, tts_request(body)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(detail(&busy_body).contains("busy"));

    release_tx.send(()).unwrap();
    let (status, _, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}
