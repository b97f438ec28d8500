use curator_core::config::ThumbnailConfig;
use curator_core::media::{list_media, tag_counts};
use curator_core::models::TagCount;
use curator_core::{operations, thumbnails, JobError};
use image::{GenericImageView, ImageBuffer, Rgb};
use storage::{DatasetLayout, Tree};

fn dataset() -> (tempfile::TempDir, DatasetLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = DatasetLayout::under_root(dir.path());
    (dir, layout)
}

fn write_png(path: &std::path::Path, w: u32, h: u32) {
    ImageBuffer::from_pixel(w, h, Rgb([200u8, 40, 40])).save(path).unwrap();
}

#[tokio::test]
async fn reject_by_score_moves_only_low_scored_files() {
    let (dir, layout) = dataset();
    for (name, tags) in [
        ("low.png", Some("a, aesthetic_score:2.5")),
        ("high.png", Some("aesthetic_score:6")),
        ("edge.png", Some("aesthetic_score:4")),
        ("unscored.png", Some("a")),
        ("bare.png", None),
    ] {
        std::fs::write(dir.path().join(name), b"img").unwrap();
        if let Some(tags) = tags {
            let stem = name.trim_end_matches(".png");
            std::fs::write(dir.path().join(format!("{}.txt", stem)), tags).unwrap();
        }
    }
    let names: Vec<String> = ["low.png", "high.png", "edge.png", "unscored.png", "bare.png"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rejected = operations::reject_by_score(&layout, &names, 4.0).await.unwrap();

    assert_eq!(rejected, vec!["low.png".to_string()]);
    assert!(dir.path().join("_rejected/low.png").exists());
    assert!(dir.path().join("_rejected/low.txt").exists());
    assert!(dir.path().join("edge.png").exists());
    assert!(dir.path().join("unscored.png").exists());
}

#[tokio::test]
async fn reject_by_score_keeps_going_when_a_move_fails() {
    let (dir, layout) = dataset();
    for name in ["a", "b"] {
        std::fs::write(dir.path().join(format!("{}.png", name)), b"img").unwrap();
        std::fs::write(dir.path().join(format!("{}.txt", name)), "aesthetic_score:1").unwrap();
    }
    // A plain file where the rejected tree should be makes every move fail.
    std::fs::write(dir.path().join("_rejected"), b"not a directory").unwrap();
    let names = vec!["a.png".to_string(), "b.png".to_string()];

    let rejected = operations::reject_by_score(&layout, &names, 4.0).await.unwrap();

    assert!(rejected.is_empty());
    assert!(dir.path().join("a.png").exists());
    assert!(dir.path().join("b.png").exists());
}

#[tokio::test]
async fn clearing_pseudo_tags_reports_changed_files() {
    let (dir, layout) = dataset();
    std::fs::write(dir.path().join("a.txt"), "x, rating:2, aesthetic_score:5.1").unwrap();
    std::fs::write(dir.path().join("b.txt"), "y").unwrap();

    assert_eq!(operations::clear_ratings(&layout).await.unwrap(), 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
        "x, aesthetic_score:5.1"
    );
    assert_eq!(operations::clear_aesthetic_scores(&layout).await.unwrap(), 1);
    assert_eq!(operations::clear_ratings(&layout).await.unwrap(), 0);
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x");
}

#[tokio::test]
async fn rating_is_upserted_and_validated() {
    let (dir, layout) = dataset();
    std::fs::write(dir.path().join("a.png"), b"img").unwrap();
    std::fs::write(dir.path().join("a.txt"), "x, rating:1").unwrap();

    operations::set_rating(&layout, "a.png", Some(3)).await.unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x, rating:3");
    operations::set_rating(&layout, "a.png", None).await.unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x");

    assert!(matches!(
        operations::set_rating(&layout, "a.png", Some(4)).await,
        Err(JobError::Invalid(_))
    ));
    assert!(matches!(
        operations::set_rating(&layout, "nope.png", Some(1)).await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn saved_content_keeps_one_pseudo_tag_per_prefix() {
    let (dir, layout) = dataset();
    let tags = operations::save_content(
        &layout,
        Tree::Active,
        "a.png",
        "rating:1, cat, cat, rating:2, ,dog",
    )
    .await
    .unwrap();
    assert_eq!(tags.rating(), Some(2));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
        "cat, rating:2, dog"
    );
}

#[tokio::test]
async fn moves_require_the_image() {
    let (dir, layout) = dataset();
    assert!(matches!(
        operations::reject(&layout, "ghost.png").await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        operations::restore(&layout, "ghost.png").await,
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        operations::delete_media(&layout, "ghost.png").await,
        Err(JobError::NotFound(_))
    ));

    std::fs::write(dir.path().join("a.png"), b"img").unwrap();
    let report = operations::reject(&layout, "a.png").await.unwrap();
    assert!(report.image);
    let report = operations::restore(&layout, "a.png").await.unwrap();
    assert!(report.image);
    assert!(dir.path().join("a.png").exists());
}

#[tokio::test]
async fn listing_reads_tags_dimensions_and_urls() {
    let (dir, layout) = dataset();
    write_png(&dir.path().join("my cat.png"), 12, 7);
    std::fs::write(dir.path().join("my cat.txt"), "cat, rating:2, aesthetic_score:6.5\n").unwrap();
    std::fs::write(dir.path().join("broken.JPG"), b"not really").unwrap();
    std::fs::write(dir.path().join("notes.md"), b"#").unwrap();
    std::fs::create_dir_all(dir.path().join("_rejected")).unwrap();
    std::fs::write(dir.path().join("_rejected/old.png"), b"img").unwrap();

    let items = list_media(&layout, Tree::Active).await.unwrap();
    let names: Vec<_> = items.iter().map(|i| i.filename.as_str()).collect();
    assert_eq!(names, vec!["broken.JPG", "my cat.png"]);

    let cat = &items[1];
    assert_eq!(cat.content, "cat, rating:2, aesthetic_score:6.5");
    assert_eq!(cat.tags, vec!["cat", "rating:2", "aesthetic_score:6.5"]);
    assert_eq!(cat.rating, Some(2));
    assert_eq!(cat.aesthetic_score, Some(6.5));
    assert_eq!((cat.width, cat.height), (Some(12), Some(7)));
    assert_eq!(cat.image_url, "/user-images/my%20cat.png");
    assert_eq!(cat.thumbnail_url, "/thumbnails/my%20cat.png");

    let broken = &items[0];
    assert_eq!(broken.content, "");
    assert_eq!(broken.width, None);

    let rejected = list_media(&layout, Tree::Rejected).await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].image_url, "/rejected-images/old.png");
}

#[tokio::test]
async fn tag_counts_rank_by_usage() {
    let (dir, layout) = dataset();
    std::fs::write(dir.path().join("a.txt"), "cat, dog").unwrap();
    std::fs::write(dir.path().join("b.txt"), "cat").unwrap();

    let counts = tag_counts(&layout).await.unwrap();
    assert_eq!(
        counts,
        vec![
            TagCount { name: "cat".into(), count: 2 },
            TagCount { name: "dog".into(), count: 1 },
        ]
    );
}

#[test]
fn thumbnails_are_created_once() {
    let (dir, layout) = dataset();
    write_png(&dir.path().join("a.png"), 40, 20);
    std::fs::write(dir.path().join("junk.png"), b"not an image").unwrap();
    let settings = ThumbnailConfig::default();

    let first = thumbnails::generate_missing(&layout, Tree::Active, &settings).unwrap();
    assert_eq!((first.created, first.failed), (1, 1));
    let thumb = dir.path().join(".thumbnails/a.png");
    let decoded = image::io::Reader::open(&thumb)
        .unwrap()
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap();
    assert_eq!((decoded.width(), decoded.height()), (300, 300));
    assert!(!dir.path().join(".thumbnails/junk.png").exists());

    let second = thumbnails::generate_missing(&layout, Tree::Active, &settings).unwrap();
    assert_eq!((second.created, second.existing), (0, 1));
}
