use std::sync::Arc;
use std::time::Duration;

use ::common::ImageCatalog;
use ::common::retry::RetryTracker;
use tokio::sync::Mutex;
use worker::{DeriveSettings, Deriver, JobOutcome, JobProcessor};

use crate::common::{JOBS, TestApp, routes};

fn processor(app: &TestApp) -> JobProcessor {
    JobProcessor::new(
        Deriver::new(app.media.clone(), DeriveSettings::default()),
        Arc::new(app.queue.clone()),
        "images_dlq",
        Arc::new(Mutex::new(RetryTracker::new(
            3,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ))),
    )
}

#[tokio::test]
async fn upload_then_derive_serves_renditions() {
    let app = TestApp::spawn().await;
    let id = app.upload_png(60, 300).await;

    let delivery = app.queue.try_consume(JOBS).expect("job published");
    assert_eq!(delivery.body(), id);
    let outcome = processor(&app).handle(delivery).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)), "{outcome:?}");

    for label in ["orig", "256", "128"] {
        let res = app
            .get_raw(&routes::media(&format!("{id}--{label}.jpg")), None)
            .await;
        assert_eq!(res.status().as_u16(), 200, "{label}");
        assert_eq!(res.headers()["content-type"], "image/jpeg");
        assert_eq!(
            res.headers()["cache-control"],
            "public, max-age=31536000, immutable"
        );
        let bytes = res.bytes().await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
    for label in ["1024", "640"] {
        let res = app.get(&routes::media(&format!("{id}--{label}.jpg"))).await;
        assert_eq!(res.status, 404, "{label}");
    }

    let image = app.get(&routes::image(&id)).await;
    assert!(image.body["sizeBytes"].as_i64().unwrap() > 0);
    assert_eq!(image.body["width"], 60);
    assert_eq!(image.body["height"], 300);
}

#[tokio::test]
async fn concurrent_jobs_stay_under_their_own_prefix() {
    let app = TestApp::spawn().await;
    let first = app.upload_png(10, 700).await;
    let second = app.upload_png(10, 150).await;
    let processor = Arc::new(processor(&app));

    let mut handles = Vec::new();
    while let Some(delivery) = app.queue.try_consume(JOBS) {
        let processor = Arc::clone(&processor);
        handles.push(tokio::spawn(async move { processor.handle(delivery).await }));
    }
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for (id, expected) in [(&first, 4), (&second, 2)] {
        let uuid = id.parse().unwrap();
        let renditions = app.catalog.renditions_of(uuid).await.unwrap();
        assert_eq!(renditions.len(), expected);
        assert!(renditions.iter().all(|r| r.filename.starts_with(id.as_str())));
    }
}
