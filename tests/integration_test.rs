mod common;

use common::{client_for, init_tracing, load_fixture, mount_save, mount_stream};
use std::time::Duration;
use teachkit_stream::{
    Error, LessonPlanKind, LessonPlanRequest, QuizRequest, RubricRequest, SessionController,
    SessionStatus,
};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rubric_request() -> RubricRequest {
    RubricRequest {
        grade: "Lớp 10".to_string(),
        assessment_type: "Thuyết trình".to_string(),
        ..RubricRequest::new("Thuyết trình nhóm", "Ngữ văn", 1)
    }
}

#[tokio::test]
async fn test_rubric_stream_end_to_end() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rubrics/stream"))
        .and(body_string_contains("name=\"rubric_title\""))
        .and(body_string_contains("name=\"number_of_criteria\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(load_fixture("rubric.sse")),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_save(&server, "/rubrics/save", "rubric-db-1").await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let outcome = controller
        .begin(rubric_request())
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.artifact_token.as_deref(), Some("tok1"));
    assert_eq!(outcome.accumulated["criteria"].as_array().unwrap().len(), 1);
    assert_eq!(outcome.progress_step.as_deref(), Some("starting"));
    assert_eq!(outcome.view.name, "Thuyết trình nhóm");
    assert_eq!(outcome.view.grade, "Lớp 10");
    assert!(outcome.saved);
    assert_eq!(outcome.id, "rubric-db-1");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.id, "rubric-db-1");
    assert_eq!(snapshot.artifact_token.as_deref(), Some("tok1"));
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_bad_frame_does_not_abort_stream() {
    let server = MockServer::start().await;
    mount_stream(&server, "/rubrics/stream", "rubric_bad_frame.sse").await;
    mount_save(&server, "/rubrics/save", "rubric-db-2").await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let outcome = controller
        .begin(RubricRequest::new("Thuyết trình", "Ngữ văn", 2))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.artifact_token.as_deref(), Some("rubric_42.docx"));
    assert_eq!(outcome.view.criteria.len(), 2);
    assert_eq!(outcome.view.table.len(), 1);
    assert_eq!(outcome.view.table[0].descriptions, vec!["Đầy đủ", "N/A"]);
    assert_eq!(outcome.view.progress, 90);
}

#[tokio::test]
async fn test_non_success_status_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rubrics/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let err = controller
        .begin(rubric_request())
        .unwrap()
        .await
        .unwrap()
        .unwrap_err();

    match err {
        Error::Connection { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model overloaded");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Failed);
    assert!(snapshot.failure.unwrap().contains("model overloaded"));
}

#[tokio::test]
async fn test_save_failure_keeps_session_completed() {
    let server = MockServer::start().await;
    mount_stream(&server, "/rubrics/stream", "rubric.sse").await;
    Mock::given(method("POST"))
        .and(path("/rubrics/save"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .expect(1)
        .mount(&server)
        .await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let outcome = controller
        .begin(rubric_request())
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert!(!outcome.saved);
    assert!(outcome.id.starts_with("tmp-"));
    assert_eq!(controller.snapshot().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_validation_error_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut controller = SessionController::<QuizRequest>::new(client_for(&server));
    let err = controller.begin(QuizRequest::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(controller.snapshot().status, SessionStatus::Idle);
}

#[tokio::test]
async fn test_quiz_stream_merges_final_detail() {
    let server = MockServer::start().await;
    mount_stream(&server, "/quizzes/stream", "quiz.sse").await;
    mount_save(&server, "/quizzes/save", "quiz-db-1").await;

    let mut controller = SessionController::<QuizRequest>::new(client_for(&server));
    let outcome = controller
        .begin(QuizRequest::from_text("Địa lý Việt Nam"))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.artifact_token, None);
    assert_eq!(outcome.view.question_count, 2);
    assert_eq!(outcome.view.name, "Kiểm tra 15 phút");
    assert_eq!(outcome.view.subject, "Địa lý");
    assert_eq!(outcome.view.grade.as_deref(), Some("7"));
    assert_eq!(outcome.view.download_url, None);
    assert_eq!(outcome.progress_step.as_deref(), Some("generated"));
    assert_eq!(outcome.id, "quiz-db-1");
}

#[tokio::test]
async fn test_lesson_plan_stream_selects_generator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lesson-plans/stream"))
        .and(query_param("type", "kindergarten"))
        .and(body_string_contains("gemini-2.5-flash"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(load_fixture("lesson_plan.sse")),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_save(&server, "/lesson-plans/save", "lp-db-1").await;

    let request = LessonPlanRequest {
        kind: LessonPlanKind::Kindergarten,
        ..LessonPlanRequest::new("Phân số", "4", "Toán")
    };
    let mut controller = SessionController::<LessonPlanRequest>::new(client_for(&server));
    let outcome = controller.begin(request).unwrap().await.unwrap().unwrap();

    assert_eq!(outcome.artifact_token.as_deref(), Some("lp_9.docx"));
    assert_eq!(outcome.view.sections.len(), 2);
    assert_eq!(outcome.view.sections[0].kind, "objectives");
    assert_eq!(outcome.view.lesson_title, "Phân số");
    assert!(!outcome.view.html.contains("ignored"));
}

#[tokio::test]
async fn test_cancel_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rubrics/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(load_fixture("rubric.sse"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let handle = controller.begin(rubric_request()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert!(snapshot.failure.is_none());
}

#[tokio::test]
async fn test_new_session_cancels_previous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rubrics/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(load_fixture("rubric.sse"))
                .set_delay(Duration::from_secs(5)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_stream(&server, "/rubrics/stream", "rubric.sse").await;
    mount_save(&server, "/rubrics/save", "rubric-db-3").await;

    let mut controller = SessionController::<RubricRequest>::new(client_for(&server));
    let first = controller.begin(rubric_request()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = controller.begin(rubric_request()).unwrap();

    assert!(matches!(first.await.unwrap(), Err(Error::Cancelled)));
    let outcome = second.await.unwrap().unwrap();
    assert_eq!(outcome.id, "rubric-db-3");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.id, "rubric-db-3");
}

#[tokio::test]
async fn test_download_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rubrics/download/tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04docx".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let bytes = client.download("rubrics", "tok1").await.unwrap();
    assert_eq!(&bytes[..4], b"PK\x03\x04");

    let missing = client.download("rubrics", "nope").await.unwrap_err();
    assert!(matches!(missing, Error::Connection { status: 404, .. }));
}
