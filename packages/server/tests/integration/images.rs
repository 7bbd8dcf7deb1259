use crate::common::{JOBS, MAX_UPLOAD, TestApp, png, routes};

mod upload {
    use super::*;

    #[tokio::test]
    async fn accepted_upload_is_stored_and_queued() {
        let app = TestApp::spawn().await;

        let res = app
            .upload(png(32, 48), "photo.png", Some("image/png"), Some("user-7"))
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        let id = res.id();
        assert_eq!(app.queue.pending(JOBS), vec![id.clone()]);
        assert_eq!(app.catalog.len().await, 1);
        assert_eq!(app.blob_files().len(), 1);
    }

    #[tokio::test]
    async fn text_upload_is_rejected_without_side_effects() {
        let app = TestApp::spawn().await;

        let res = app
            .upload(b"hello".to_vec(), "notes.txt", Some("text/plain"), Some("u"))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert!(app.queue.pending(JOBS).is_empty());
        assert!(app.catalog.is_empty().await);
        assert_eq!(app.blob_files(), Vec::<std::path::PathBuf>::new());
    }

    #[tokio::test]
    async fn missing_user_id_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .upload(png(8, 8), "photo.png", Some("image/png"), None)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert!(res.body["message"].as_str().unwrap().contains("userId"));
        assert!(app.catalog.is_empty().await);
    }

    #[tokio::test]
    async fn missing_image_part_is_rejected() {
        let app = TestApp::spawn().await;
        let form = reqwest::multipart::Form::new().text("userId", "u");

        let res = app
            .client
            .post(app.url(routes::IMAGES))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn untyped_part_is_guessed_from_filename() {
        let app = TestApp::spawn().await;

        let res = app.upload(png(8, 8), "photo.png", None, Some("u")).await;
        assert_eq!(res.status, 201, "{}", res.text);

        let image = app.get(&routes::image(&res.id())).await;
        assert_eq!(image.body["contentType"], "image/png");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .upload(
                vec![0u8; MAX_UPLOAD as usize + 1],
                "big.jpg",
                Some("image/jpeg"),
                Some("u"),
            )
            .await;

        assert_eq!(res.status, 400);
        assert!(app.catalog.is_empty().await);
    }
}

mod lookup {
    use super::*;

    #[tokio::test]
    async fn returns_metadata_and_all_download_links() {
        let app = TestApp::spawn().await;
        let id = app.upload_png(20, 30).await;

        let res = app.get(&routes::image(&id)).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["id"], id.as_str());
        assert_eq!(res.body["url"], routes::media(&id).as_str());
        assert_eq!(res.body["contentType"], "image/png");
        assert_eq!(res.body["ownerId"], "user-1");
        assert!(res.body["sizeBytes"].is_null());

        let links: Vec<&str> = res.body["downloadLinks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let expected: Vec<String> = ["orig", "1024", "640", "256", "128"]
            .iter()
            .map(|label| routes::media(&format!("{id}--{label}.jpg")))
            .collect();
        assert_eq!(links, expected);
    }

    #[tokio::test]
    async fn unknown_and_unparsable_ids_are_not_found() {
        let app = TestApp::spawn().await;

        let unknown = app
            .get(&routes::image("01920c5e-7a3b-7c4d-9e8f-0a1b2c3d4e5f"))
            .await;
        assert_eq!(unknown.status, 404);
        assert_eq!(unknown.code(), "NOT_FOUND");

        let garbage = app.get(&routes::image("not-a-uuid")).await;
        assert_eq!(garbage.status, 404);
        assert_eq!(garbage.code(), "NOT_FOUND");
    }
}
