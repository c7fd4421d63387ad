use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use picbed_core::config::{
    ConfigStore, MemoryStore, MockConfigStore, CUSTOM_IMAGE_HOSTING, IMAGE_HOSTING_TYPE,
    IS_CONTAIN_IMG_NAME, QINIU_IMAGE_HOSTING,
};
use picbed_core::contract::{
    HttpResponse, ImageFile, Method, MockTransport, MockUploadObserver, Progress, ResultLog,
    SilentObserver, UploadObserver, UploadRequest,
};
use picbed_core::dispatch::{unknown_selection_notice, Dispatcher, NO_SELECTION_NOTICE};
use picbed_core::editor::{Cursor, EditorDocument, EditorError, MockEditorDocument, TextBuffer};
use picbed_core::error::{StoreError, UploadError};
use picbed_core::host::{BackendId, Endpoints};
use picbed_core::notify::{MockNotifier, NotificationBridge};

const SMMS_TEST_URL: &str = "https://smms.test/upload";

fn endpoints() -> Endpoints {
    Endpoints {
        smms_upload: SMMS_TEST_URL.to_string(),
        ..Endpoints::default()
    }
}

fn dispatcher(
    store: Arc<dyn ConfigStore>,
    transport: MockTransport,
    notifier: NotificationBridge,
) -> Dispatcher {
    Dispatcher::with_endpoints(store, Arc::new(transport), Arc::new(notifier), endpoints())
        .with_success_delay(Duration::ZERO)
}

fn smms_ok() -> HttpResponse {
    HttpResponse::json(
        200,
        &json!({
            "success": true,
            "code": "success",
            "data": { "url": "https://i.loli.net/2024/05/01/abc.png", "filename": "abc.png" }
        }),
    )
}

/// Notifier that accepts everything and records info messages.
fn recording_notifier(infos: Arc<Mutex<Vec<String>>>) -> MockNotifier {
    let mut notifier = MockNotifier::new();
    notifier.expect_loading().returning(|_| Ok(()));
    notifier.expect_success().returning(|_| Ok(()));
    notifier.expect_dismiss().returning(|| Ok(()));
    notifier.expect_error().returning(|_| Ok(()));
    notifier.expect_warning().returning(|_| Ok(()));
    notifier.expect_info().returning(move |message| {
        infos.lock().unwrap().push(message.to_string());
        Ok(())
    });
    notifier
}

fn request(results: &ResultLog, observer: Arc<dyn UploadObserver>) -> UploadRequest {
    UploadRequest::new(
        ImageFile::new("photo.PNG", vec![7u8; 256]),
        observer,
        results.clone(),
    )
}

#[tokio::test]
async fn absent_selection_falls_back_to_smms_with_notice() {
    let store = Arc::new(MemoryStore::new());
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req, _| req.method == Method::Post && req.url == SMMS_TEST_URL)
        .times(1)
        .returning(|_, _| Ok(smms_ok()));
    let infos = Arc::new(Mutex::new(Vec::new()));
    let bridge = NotificationBridge::new(Arc::new(recording_notifier(infos.clone())));

    let results = ResultLog::new();
    let outcome = dispatcher(store, transport, bridge)
        .dispatch(&request(&results, Arc::new(SilentObserver)))
        .await
        .expect("upload should succeed");

    assert_eq!(outcome.filename, "photo");
    assert_eq!(outcome.url, "https://i.loli.net/2024/05/01/abc.png");
    assert_eq!(results.snapshot(), vec![outcome]);
    assert_eq!(*infos.lock().unwrap(), vec![NO_SELECTION_NOTICE.to_string()]);
}

#[tokio::test]
async fn unknown_selection_falls_back_to_smms_with_notice() {
    let store = Arc::new(MemoryStore::new().with(IMAGE_HOSTING_TYPE, "imgur"));
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req, _| req.url == SMMS_TEST_URL)
        .times(1)
        .returning(|_, _| Ok(smms_ok()));
    let infos = Arc::new(Mutex::new(Vec::new()));
    let bridge = NotificationBridge::new(Arc::new(recording_notifier(infos.clone())));

    let results = ResultLog::new();
    dispatcher(store, transport, bridge)
        .dispatch(&request(&results, Arc::new(SilentObserver)))
        .await
        .expect("upload should succeed");

    assert_eq!(
        *infos.lock().unwrap(),
        vec![unknown_selection_notice("imgur")]
    );
}

#[tokio::test]
async fn unreadable_selection_falls_back_to_smms() {
    let mut store = MockConfigStore::new();
    store
        .expect_get()
        .withf(|key| key == IMAGE_HOSTING_TYPE)
        .returning(|_| Err(StoreError("disk gone".to_string())));
    store
        .expect_get()
        .withf(|key| key != IMAGE_HOSTING_TYPE)
        .returning(|_| Ok(None));

    let dispatcher = dispatcher(
        Arc::new(store),
        MockTransport::new(),
        NotificationBridge::log_only(),
    );
    let resolution = dispatcher.resolve().expect("smms needs no settings");
    assert_eq!(resolution.backend, BackendId::Smms);
    assert_eq!(resolution.notice.as_deref(), Some(NO_SELECTION_NOTICE));
}

#[tokio::test]
async fn incomplete_qiniu_settings_fail_before_any_network_call() {
    let store = Arc::new(
        MemoryStore::new()
            .with(IMAGE_HOSTING_TYPE, "qiniu")
            .with(
                QINIU_IMAGE_HOSTING,
                json!({ "accessKey": "ak", "secretKey": "sk", "bucket": "images" }).to_string(),
            ),
    );
    let mut transport = MockTransport::new();
    transport.expect_send().times(0);

    let mut observer = MockUploadObserver::new();
    observer
        .expect_on_error()
        .withf(|error, message| {
            matches!(error, UploadError::Configuration { missing, .. } if missing == &vec!["domain"])
                && message.contains("domain")
        })
        .times(1)
        .return_const(());
    observer.expect_on_success().times(0);

    let mut notifier = MockNotifier::new();
    notifier.expect_error().times(1).returning(|_| Ok(()));
    notifier.expect_loading().times(0);

    let results = ResultLog::new();
    let outcome = dispatcher(store, transport, NotificationBridge::new(Arc::new(notifier)))
        .dispatch(&request(&results, Arc::new(observer)))
        .await;

    assert!(matches!(outcome, Err(UploadError::Configuration { .. })));
    assert!(results.is_empty());
}

#[tokio::test]
async fn legacy_display_names_select_builtin_backends() {
    let store = Arc::new(MemoryStore::new().with(IMAGE_HOSTING_TYPE, "七牛云"));
    let dispatcher = dispatcher(
        store.clone(),
        MockTransport::new(),
        NotificationBridge::log_only(),
    );

    // Selected, but not configured yet.
    let error = dispatcher.resolve().expect_err("qiniu settings are missing");
    assert!(error.is_configuration());

    store.set(
        QINIU_IMAGE_HOSTING,
        json!({ "accessKey": "ak", "secretKey": "sk", "bucket": "b", "domain": "cdn.example.com" })
            .to_string(),
    );
    let resolution = dispatcher.resolve().expect("settings are complete now");
    assert_eq!(resolution.backend, BackendId::Qiniu);
    assert_eq!(resolution.notice, None);
}

#[tokio::test]
async fn malformed_settings_are_a_configuration_error() {
    let store = Arc::new(
        MemoryStore::new()
            .with(IMAGE_HOSTING_TYPE, "gitee")
            .with("gitee_image_hosting", "{not json"),
    );
    let dispatcher = dispatcher(store, MockTransport::new(), NotificationBridge::log_only());
    let error = dispatcher.resolve().expect_err("settings cannot be parsed");
    assert!(error.to_string().contains("malformed"));
}

#[tokio::test]
async fn custom_selection_without_url_fails_without_network_call() {
    let store = Arc::new(
        MemoryStore::new()
            .with(IMAGE_HOSTING_TYPE, "my-host")
            .with(
                CUSTOM_IMAGE_HOSTING,
                json!({ "hostingName": "my-host", "hostingUrl": "  " }).to_string(),
            ),
    );
    let mut transport = MockTransport::new();
    transport.expect_send().times(0);

    let mut observer = MockUploadObserver::new();
    observer
        .expect_on_error()
        .withf(|_, message| message == "custom backend URL not set")
        .times(1)
        .return_const(());

    let results = ResultLog::new();
    let outcome = dispatcher(store, transport, NotificationBridge::log_only())
        .dispatch(&request(&results, Arc::new(observer)))
        .await;
    assert!(outcome.is_err());
    assert!(results.is_empty());
}

#[tokio::test]
async fn custom_selection_uploads_to_configured_url() {
    let store = Arc::new(
        MemoryStore::new()
            .with(IMAGE_HOSTING_TYPE, "my-host")
            .with(
                CUSTOM_IMAGE_HOSTING,
                json!({ "hostingName": "my-host", "hostingUrl": "https://img.example.com/api" })
                    .to_string(),
            ),
    );
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req, _| req.method == Method::Post && req.url == "https://img.example.com/api")
        .times(1)
        .returning(|_, _| {
            Ok(HttpResponse::json(
                200,
                &json!({ "url": "https://img.example.com/u/1.png", "link": "https://other" }),
            ))
        });

    let results = ResultLog::new();
    let outcome = dispatcher(store, transport, NotificationBridge::log_only())
        .dispatch(&request(&results, Arc::new(SilentObserver)))
        .await
        .expect("upload should succeed");
    assert_eq!(outcome.url, "https://img.example.com/u/1.png");
    assert_eq!(outcome.filename, "photo");
}

#[tokio::test]
async fn success_reports_once_and_progress_never_goes_backwards() {
    let store = Arc::new(MemoryStore::new().with(IMAGE_HOSTING_TYPE, "smms"));
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_, progress| {
        let progress = progress.expect("uploads report progress");
        progress(10, 100);
        progress(604, 1000);
        progress(30, 100);
        progress(60, 100);
        progress(100, 100);
        Ok(smms_ok())
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut observer = MockUploadObserver::new();
    let sink = seen.clone();
    observer
        .expect_on_progress()
        .returning(move |progress: Progress, _| sink.lock().unwrap().push(progress.percent));
    observer
        .expect_on_success()
        .withf(|response, file| response["code"] == "success" && file.name == "photo.PNG")
        .times(1)
        .return_const(());
    observer.expect_on_error().times(0);

    let results = ResultLog::new();
    dispatcher(store, transport, NotificationBridge::log_only())
        .dispatch(&request(&results, Arc::new(observer)))
        .await
        .expect("upload should succeed");

    assert_eq!(*seen.lock().unwrap(), vec![10, 60, 100]);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn server_failure_reports_once_and_appends_nothing() {
    let store = Arc::new(MemoryStore::new());
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_, _| {
        Ok(HttpResponse::json(
            200,
            &json!({ "success": false, "code": "image_repeated", "message": "Image upload repeated limit" }),
        ))
    });

    let mut observer = MockUploadObserver::new();
    observer.expect_on_progress().return_const(());
    observer.expect_on_success().times(0);
    observer
        .expect_on_error()
        .withf(|error, message| {
            matches!(error, UploadError::Server { .. }) && message.contains("repeated limit")
        })
        .times(1)
        .return_const(());

    let mut notifier = MockNotifier::new();
    notifier.expect_info().returning(|_| Ok(()));
    notifier.expect_loading().times(1).returning(|_| Ok(()));
    notifier.expect_dismiss().times(1).returning(|| Ok(()));
    notifier.expect_error().times(1).returning(|_| Ok(()));
    notifier.expect_success().times(0);

    let results = ResultLog::new();
    let outcome = dispatcher(store, transport, NotificationBridge::new(Arc::new(notifier)))
        .dispatch(&request(&results, Arc::new(observer)))
        .await;
    assert!(outcome.is_err());
    assert!(results.is_empty());
}

#[tokio::test]
async fn concurrent_uploads_share_the_result_log() {
    let store = Arc::new(MemoryStore::new().with(IMAGE_HOSTING_TYPE, "smms"));
    let mut transport = MockTransport::new();
    transport.expect_send().times(3).returning(|_, _| Ok(smms_ok()));
    let dispatcher = dispatcher(store, transport, NotificationBridge::log_only());

    let results = ResultLog::new();
    let requests: Vec<UploadRequest> = (0..3)
        .map(|i| {
            UploadRequest::new(
                ImageFile::new(format!("shot-{i}.png"), vec![1u8; 8]),
                Arc::new(SilentObserver),
                results.clone(),
            )
        })
        .collect();
    let outcomes =
        futures::future::join_all(requests.iter().map(|r| dispatcher.dispatch(r))).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(results.len(), 3);
}

#[test]
fn every_builtin_backend_and_custom_are_registered() {
    let dispatcher = dispatcher(
        Arc::new(MemoryStore::new()),
        MockTransport::new(),
        NotificationBridge::log_only(),
    );
    assert_eq!(
        dispatcher.backends(),
        vec![
            BackendId::Smms,
            BackendId::Qiniu,
            BackendId::Aliyun,
            BackendId::Gitee,
            BackendId::GitHub,
            BackendId::Custom,
        ]
    );
}

#[tokio::test]
async fn successful_upload_links_the_image_into_the_document() {
    let store = Arc::new(
        MemoryStore::new()
            .with(IMAGE_HOSTING_TYPE, "smms")
            .with(IS_CONTAIN_IMG_NAME, "true"),
    );
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_, _| Ok(smms_ok()));
    let buffer = Arc::new(TextBuffer::at_end(""));
    let results = ResultLog::new();
    let request = request(&results, Arc::new(SilentObserver))
        .with_document(buffer.clone() as Arc<dyn EditorDocument>);

    dispatcher(store, transport, NotificationBridge::log_only())
        .dispatch(&request)
        .await
        .expect("upload should succeed");

    assert_eq!(
        buffer.value(),
        "\n![photo](https://i.loli.net/2024/05/01/abc.png)\n"
    );
    assert_eq!(buffer.commits(), 1);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn editor_failure_does_not_fail_the_upload() {
    let store = Arc::new(MemoryStore::new().with(IMAGE_HOSTING_TYPE, "smms"));
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .times(1)
        .returning(|_, _| Ok(smms_ok()));
    let mut document = MockEditorDocument::new();
    document.expect_cursor().returning(|| Ok(Cursor::default()));
    document
        .expect_replace_selection()
        .times(1)
        .returning(|_, _| Err(EditorError::Unavailable("editor closed".to_string())));
    document.expect_set_content().times(0);

    let mut observer = MockUploadObserver::new();
    observer.expect_on_progress().return_const(());
    observer.expect_on_success().times(1).return_const(());
    observer.expect_on_error().times(0);

    let results = ResultLog::new();
    let request = request(&results, Arc::new(observer)).with_document(Arc::new(document));

    let result = dispatcher(store, transport, NotificationBridge::log_only())
        .dispatch(&request)
        .await
        .expect("upload still succeeds");

    assert_eq!(result.filename, "photo");
    assert_eq!(results.len(), 1);
}
