use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::Filter;

use crate::error::SyncError;
use crate::session::SessionSynchronizer;

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

/// All control routes for one supervised session
pub fn session_routes(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    session_health_check()
        .or(session_status(sync.clone()))
        .or(session_check_in(sync.clone()))
        .or(session_confirm_attendance(sync.clone()))
        .or(session_refresh(sync.clone()))
        .or(session_finish(sync))
}

pub fn session_health_check() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "health")
        .and(warp::get())
        .map(|| {
            warp::reply::json(&json!({
                "status": "healthy",
                "service": "Proctor Sync",
                "version": env!("CARGO_PKG_VERSION")
            }))
        })
}

pub fn session_status(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("session")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_sync(sync))
        .map(|sync: Arc<SessionSynchronizer>| warp::reply::json(&sync.view()))
}

pub fn session_check_in(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "participants" / String / "check-in")
        .and(warp::post())
        .and(with_sync(sync))
        .and_then(handle_check_in)
}

pub fn session_confirm_attendance(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "confirm-attendance")
        .and(warp::post())
        .and(with_sync(sync))
        .map(|sync: Arc<SessionSynchronizer>| match sync.confirm_attendance() {
            Ok(()) => ok_reply(json!({ "attendanceConfirmed": true })),
            Err(e) => error_reply(&e),
        })
}

pub fn session_refresh(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "refresh")
        .and(warp::post())
        .and(with_sync(sync))
        .and_then(handle_refresh)
}

pub fn session_finish(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("session" / "finish")
        .and(warp::post())
        .and(with_sync(sync))
        .and_then(handle_finish)
}

async fn handle_check_in(
    participant_id: String,
    sync: Arc<SessionSynchronizer>,
) -> Result<JsonReply, Infallible> {
    Ok(match sync.check_in(&participant_id).await {
        Ok(checked_in) => ok_reply(json!({
            "participantId": participant_id,
            "checkedIn": checked_in
        })),
        Err(e) => error_reply(&e),
    })
}

async fn handle_refresh(sync: Arc<SessionSynchronizer>) -> Result<JsonReply, Infallible> {
    Ok(match sync.manual_refresh().await {
        Ok(()) => ok_reply(sync.view()),
        Err(e) => error_reply(&e),
    })
}

async fn handle_finish(sync: Arc<SessionSynchronizer>) -> Result<JsonReply, Infallible> {
    Ok(match sync.finish().await {
        Ok(()) => ok_reply(json!({ "lifecycle": sync.lifecycle() })),
        Err(e) => error_reply(&e),
    })
}

fn ok_reply<T: Serialize>(body: T) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
}

fn error_reply(err: &SyncError) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "error": err.to_string() })),
        status_for(err),
    )
}

/// HTTP status reported to the UI for a failed command
pub fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::SessionNotFound(_) | SyncError::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
        SyncError::ReadOnlySession => StatusCode::FORBIDDEN,
        SyncError::AttendanceLocked => StatusCode::LOCKED,
        SyncError::NotPolling | SyncError::Busy | SyncError::AlreadyClosed(_) => StatusCode::CONFLICT,
        SyncError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SyncError::NetworkError(_) | SyncError::HttpStatus { .. } | SyncError::DecodeFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        SyncError::InvalidConfiguration(_)
        | SyncError::MissingConfiguration(_)
        | SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn with_sync(
    sync: Arc<SessionSynchronizer>,
) -> impl Filter<Extract = (Arc<SessionSynchronizer>,), Error = Infallible> + Clone {
    warp::any().map(move || sync.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::exam::fake::{participant, FakeExamService};
    use crate::session::SessionMode;

    async fn started(mode: SessionMode) -> (Arc<SessionSynchronizer>, Arc<FakeExamService>) {
        let fake = Arc::new(FakeExamService::new(
            "s-1",
            vec![participant("1", false), participant("2", true)],
        ));
        let (sync, _rx) =
            SessionSynchronizer::open(fake.clone(), SessionConfig::new("s-1", mode)).unwrap();
        sync.start().await.unwrap();
        (Arc::new(sync), fake)
    }

    #[tokio::test]
    async fn test_health() {
        let (sync, _fake) = started(SessionMode::Active).await;
        let resp = warp::test::request()
            .method("GET")
            .path("/session/health")
            .reply(&session_routes(sync))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_status_view() {
        let (sync, _fake) = started(SessionMode::Active).await;
        let resp = warp::test::request()
            .method("GET")
            .path("/session")
            .reply(&session_routes(sync))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["lifecycle"], "polling");
        assert_eq!(body["check_ins"]["2"], true);
        assert_eq!(body["code_countdown"], 300);
        assert_eq!(body["roster_countdown"], 5);
    }

    #[tokio::test]
    async fn test_check_in_route() {
        let (sync, fake) = started(SessionMode::Active).await;
        let resp = warp::test::request()
            .method("POST")
            .path("/session/participants/1/check-in")
            .reply(&session_routes(sync.clone()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["checkedIn"], true);
        assert_eq!(fake.count("check_in"), 1);
        assert_eq!(sync.check_in_index().get("1"), Some(&true));
    }

    #[tokio::test]
    async fn test_check_in_unknown_participant() {
        let (sync, _fake) = started(SessionMode::Active).await;
        let resp = warp::test::request()
            .method("POST")
            .path("/session/participants/99/check-in")
            .reply(&session_routes(sync))
            .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_in_locked_after_confirmation() {
        let (sync, _fake) = started(SessionMode::Active).await;
        let routes = session_routes(sync);

        let resp = warp::test::request()
            .method("POST")
            .path("/session/confirm-attendance")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("POST")
            .path("/session/participants/1/check-in")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_read_only_check_in_forbidden() {
        let (sync, _fake) = started(SessionMode::ReadOnly).await;
        let resp = warp::test::request()
            .method("POST")
            .path("/session/participants/1/check-in")
            .reply(&session_routes(sync))
            .await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_refresh_route() {
        let (sync, fake) = started(SessionMode::Active).await;
        fake.clear_calls();
        let resp = warp::test::request()
            .method("POST")
            .path("/session/refresh")
            .reply(&session_routes(sync))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fake.count("rotate_code"), 1);
        assert_eq!(fake.count("roster"), 1);
    }

    #[tokio::test]
    async fn test_finish_route_failure_then_retry() {
        let (sync, fake) = started(SessionMode::Active).await;
        let routes = session_routes(sync.clone());

        fake.fail_close(true);
        let resp = warp::test::request()
            .method("POST")
            .path("/session/finish")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        fake.fail_close(false);
        let resp = warp::test::request()
            .method("POST")
            .path("/session/finish")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["lifecycle"], "closed");

        let resp = warp::test::request()
            .method("POST")
            .path("/session/finish")
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&SyncError::Busy), StatusCode::CONFLICT);
        assert_eq!(status_for(&SyncError::Timeout("x".into())), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&SyncError::internal("x")), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
