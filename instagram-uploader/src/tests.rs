use crate::transport::{GraphResponse, MockGraphTransport};
use crate::{refresh_long_lived_token, InstagramUploader};
use crossposter_core::{Credentials, InstagramSettings, UploadError};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn settings(max_polls: u32) -> InstagramSettings {
    InstagramSettings {
        max_polling_attempts: max_polls,
        reel_polling_interval_secs: 0,
        image_polling_interval_secs: 0,
        ..InstagramSettings::default()
    }
}

fn credentials() -> Credentials {
    Credentials {
        instagram_access_token: Some("test_token".to_string()),
        instagram_user_id: Some("1784".to_string()),
        ..Credentials::default()
    }
}

fn status(code: &str) -> GraphResponse {
    GraphResponse::ok(json!({ "status_code": code, "status": "" }))
}

fn video_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"fake mp4 bytes").unwrap();
    file
}

/// Container creation, upload and publish all succeed.
fn expect_happy_path(transport: &mut MockGraphTransport) {
    transport
        .expect_post_form()
        .withf(|url, _| url.ends_with("/1784/media"))
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c1" }))));
    transport
        .expect_post_bytes()
        .times(1)
        .returning(|_, _, _| Ok(GraphResponse::ok(json!({ "success": true }))));
    transport
        .expect_post_form()
        .withf(|url, _| url.ends_with("/1784/media_publish"))
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "m1" }))));
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("content_publishing_limit"))
        .returning(|_, _| {
            Ok(GraphResponse::ok(json!({
                "data": [{ "quota_usage": 3, "config": { "quota_total": 50 } }]
            })))
        });
}

#[tokio::test]
async fn test_reel_published_after_several_polls() {
    let mut transport = MockGraphTransport::new();
    expect_happy_path(&mut transport);

    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("/c1"))
        .returning(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(status(if n < 3 { "IN_PROGRESS" } else { "FINISHED" }))
        });

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let file = video_file();
    let media_id = uploader.publish_reel(file.path(), "caption", true).await.unwrap();

    assert_eq!(media_id, "m1");
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_reel_container_params_and_upload_headers() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_post_form()
        .withf(|url, params| {
            url.ends_with("/1784/media")
                && params.contains(&("media_type".to_string(), "REELS".to_string()))
                && params.contains(&("upload_type".to_string(), "resumable".to_string()))
                && params.contains(&("share_to_feed".to_string(), "false".to_string()))
        })
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c1" }))));
    transport
        .expect_post_bytes()
        .withf(|url, headers, body| {
            url == "https://rupload.facebook.com/v19.0/c1"
                && headers.contains(&("Authorization".to_string(), "OAuth test_token".to_string()))
                && headers.contains(&("offset".to_string(), "0".to_string()))
                && headers.contains(&("file_size".to_string(), body.len().to_string()))
        })
        .times(1)
        .returning(|_, _, _| Ok(GraphResponse::ok(json!({ "success": true }))));
    transport
        .expect_post_form()
        .withf(|url, params| {
            url.ends_with("/media_publish")
                && params.contains(&("creation_id".to_string(), "c1".to_string()))
        })
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "m1" }))));
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("/c1"))
        .returning(|_, _| Ok(status("FINISHED")));
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("content_publishing_limit"))
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "data": [] }))));

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let file = video_file();
    // A broken quota lookup does not fail the upload.
    assert_eq!(
        uploader.publish_reel(file.path(), "caption", false).await.unwrap(),
        "m1"
    );
}

#[tokio::test]
async fn test_polling_never_exceeds_bound() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_post_form()
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c1" }))));
    transport
        .expect_post_bytes()
        .returning(|_, _, _| Ok(GraphResponse::ok(json!({ "success": true }))));
    transport
        .expect_get()
        .times(4)
        .returning(|_, _| Ok(status("IN_PROGRESS")));

    let uploader = InstagramUploader::new(Box::new(transport), settings(4), &credentials()).unwrap();
    let file = video_file();
    let result = uploader.publish_reel(file.path(), "caption", true).await;

    match result {
        Err(UploadError::PollingExhausted { container_id, attempts }) => {
            assert_eq!(container_id, "c1");
            assert_eq!(attempts, 4);
        }
        other => panic!("expected PollingExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_stops_polling() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_post_form()
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c1" }))));
    transport
        .expect_get()
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "status_code": "ERROR", "status": "Error: 2207026" }))));

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let result = uploader.publish_image("https://i.redd.it/x.jpg", "caption").await;

    match result {
        Err(UploadError::ContainerFailed { status, .. }) => assert!(status.contains("2207026")),
        other => panic!("expected ContainerFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transient_poll_failures_are_retried() {
    let mut transport = MockGraphTransport::new();
    expect_happy_path(&mut transport);

    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("/c1"))
        .returning(move |_, _| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(UploadError::Transport {
                stage: String::new(),
                reason: "connection reset".to_string(),
            }),
            1 => Ok(GraphResponse {
                status: 500,
                body: json!({ "error": { "message": "An unexpected error has occurred." } }),
            }),
            _ => Ok(status("PUBLISHED")),
        });

    let uploader = InstagramUploader::new(Box::new(transport), settings(5), &credentials()).unwrap();
    let file = video_file();
    assert_eq!(uploader.publish_reel(file.path(), "c", true).await.unwrap(), "m1");
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_container_http_error_is_reported() {
    let mut transport = MockGraphTransport::new();
    transport.expect_post_form().times(1).returning(|_, _| {
        Ok(GraphResponse {
            status: 400,
            body: json!({ "error": { "message": "Invalid OAuth access token.", "code": 190 } }),
        })
    });

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let result = uploader.publish_image("https://i.redd.it/x.jpg", "caption").await;

    match result {
        Err(UploadError::HttpStatus {
            stage,
            status_code,
            message,
        }) => {
            assert_eq!(stage, "container creation");
            assert_eq!(status_code, 400);
            assert_eq!(message, "Invalid OAuth access token.");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_upload() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_post_form()
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c1" }))));
    transport.expect_post_bytes().returning(|_, _, _| {
        Ok(GraphResponse::ok(json!({ "success": false, "debug_info": { "message": "ProcessingFailedError" } })))
    });

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let file = video_file();
    let result = uploader.publish_reel(file.path(), "c", true).await;
    assert!(matches!(result, Err(UploadError::UploadRejected { .. })));
}

#[tokio::test]
async fn test_missing_video_file() {
    let uploader =
        InstagramUploader::new(Box::new(MockGraphTransport::new()), settings(15), &credentials()).unwrap();
    let result = uploader
        .publish_reel(std::path::Path::new("/nope/reel.mp4"), "c", true)
        .await;
    assert!(matches!(result, Err(UploadError::MediaNotFound { .. })));
}

#[test]
fn test_missing_credentials() {
    let mut creds = credentials();
    creds.instagram_access_token = Some("YOUR_ACCESS_TOKEN_HERE".to_string());
    let result = InstagramUploader::new(Box::new(MockGraphTransport::new()), settings(15), &creds);
    assert!(matches!(
        result,
        Err(UploadError::MissingCredentials { field }) if field == "instagram_access_token"
    ));

    let mut creds = credentials();
    creds.instagram_user_id = None;
    let result = InstagramUploader::new(Box::new(MockGraphTransport::new()), settings(15), &creds);
    assert!(matches!(result, Err(UploadError::MissingCredentials { .. })));
}

#[test]
fn test_image_flow_with_block_on() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_post_form()
        .withf(|url, params| {
            url.ends_with("/1784/media")
                && params.contains(&("image_url".to_string(), "https://i.redd.it/x.jpg".to_string()))
        })
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "c9" }))));
    transport
        .expect_post_form()
        .withf(|url, _| url.ends_with("/media_publish"))
        .times(1)
        .returning(|_, _| Ok(GraphResponse::ok(json!({ "id": "m9" }))));
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("/c9"))
        .returning(|_, _| Ok(status("FINISHED")));
    transport
        .expect_get()
        .withf(|url, _| url.ends_with("content_publishing_limit"))
        .returning(|_, _| {
            Ok(GraphResponse {
                status: 403,
                body: json!({ "error": { "message": "denied" } }),
            })
        });

    let uploader = InstagramUploader::new(Box::new(transport), settings(15), &credentials()).unwrap();
    let media_id =
        tokio_test::block_on(uploader.publish_image("https://i.redd.it/x.jpg", "caption")).unwrap();
    assert_eq!(media_id, "m9");
}

#[tokio::test]
async fn test_refresh_long_lived_token() {
    let mut transport = MockGraphTransport::new();
    transport
        .expect_get()
        .withf(|url, params| {
            url == "https://graph.facebook.com/v19.0/oauth/access_token"
                && params.contains(&("grant_type".to_string(), "fb_exchange_token".to_string()))
                && params.contains(&("fb_exchange_token".to_string(), "old".to_string()))
        })
        .times(1)
        .returning(|_, _| {
            Ok(GraphResponse::ok(json!({
                "access_token": "new_long_lived",
                "token_type": "bearer",
                "expires_in": 5183944
            })))
        });

    let token = refresh_long_lived_token(&transport, &settings(15), "app", "secret", "old")
        .await
        .unwrap();
    assert_eq!(token.access_token, "new_long_lived");
    assert_eq!(token.expires_in, Some(5183944));
}
