use crate::common::{TestApp, png, routes};

#[tokio::test]
async fn original_streams_with_cache_headers() {
    let app = TestApp::spawn().await;
    let bytes = png(16, 16);
    let res = app
        .upload(bytes.clone(), "photo.png", Some("image/png"), Some("u"))
        .await;
    let id = res.id();

    let res = app.get_raw(&routes::media(&id), None).await;

    assert_eq!(res.status().as_u16(), 200);
    let headers = res.headers().clone();
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["content-length"], bytes.len().to_string().as_str());
    assert_eq!(headers["cache-control"], "public, max-age=3600");
    let etag = headers["etag"].to_str().unwrap().to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert_eq!(res.bytes().await.unwrap().as_ref(), bytes.as_slice());

    let cached = app.get_raw(&routes::media(&id), Some(&etag)).await;
    assert_eq!(cached.status().as_u16(), 304);
    assert!(cached.bytes().await.unwrap().is_empty());

    let stale = app.get_raw(&routes::media(&id), Some("\"0000\"")).await;
    assert_eq!(stale.status().as_u16(), 200);
}

#[tokio::test]
async fn unknown_filename_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app
        .get(&routes::media("01920c5e-7a3b-7c4d-9e8f-0a1b2c3d4e5f--640.jpg"))
        .await;

    assert_eq!(res.status, 404);
    assert_eq!(res.code(), "NOT_FOUND");
}
