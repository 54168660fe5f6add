//! Tests for the media store.
//!
//! Each test works against a fresh `MediaStore` rooted in a tempdir, so
//! the suite can run in parallel without shared state.

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::Bytes;
    use base64::Engine;
    use tempfile::TempDir;

    use crate::config::StorageConfig;
    use crate::storage::{data_url, make_thumbnail, MediaStore};

    fn test_store(tmp: &TempDir) -> MediaStore {
        let cfg = StorageConfig {
            media_dir: tmp.path().join("media").to_string_lossy().into_owned(),
            public_base: "/media".to_string(),
            max_file_bytes: 52_428_800,
            thumbnail_max_edge: 200,
            thumbnail_quality: 70,
        };
        let store = MediaStore::new(&cfg);
        store.ensure_dirs().unwrap();
        store
    }

    /// Renders a small gradient PNG so thumbnail derivation has real pixels.
    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Maps a public asset URL back to its on-disk path.
    fn asset_path(store: &MediaStore, url: &str) -> std::path::PathBuf {
        let rel = url.strip_prefix("/media/").expect("asset URL outside public base");
        store.root().join(rel)
    }

    #[tokio::test]
    async fn store_original_writes_file_under_scans() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let payload = Bytes::from_static(b"not really an image, storage does not care");
        let asset = store.store_original(payload.clone(), "scan.png", "image/png").await.unwrap();

        assert!(!asset.inline);
        assert!(asset.url.starts_with("/media/scans/"), "url: {}", asset.url);
        assert!(asset.url.ends_with(".png"), "url: {}", asset.url);

        let on_disk = std::fs::read(asset_path(&store, &asset.url)).unwrap();
        assert_eq!(on_disk, payload.as_ref());
    }

    #[tokio::test]
    async fn store_original_generates_unique_names() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let a = store
            .store_original(Bytes::from_static(b"one"), "scan.png", "image/png")
            .await
            .unwrap();
        let b = store
            .store_original(Bytes::from_static(b"two"), "scan.png", "image/png")
            .await
            .unwrap();
        assert_ne!(a.url, b.url);
    }

    #[tokio::test]
    async fn store_original_extension_falls_back_to_content_type() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let dicom = store
            .store_original(Bytes::from_static(b"DICM"), "series.dcm", "application/octet-stream")
            .await
            .unwrap();
        assert!(dicom.url.ends_with(".dcm"), "url: {}", dicom.url);

        let webp = store
            .store_original(Bytes::from_static(b"RIFF"), "upload", "image/webp")
            .await
            .unwrap();
        assert!(webp.url.ends_with(".webp"), "url: {}", webp.url);

        let unknown = store
            .store_original(Bytes::from_static(b"???"), "upload", "")
            .await
            .unwrap();
        assert!(unknown.url.ends_with(".bin"), "url: {}", unknown.url);
    }

    #[tokio::test]
    async fn store_thumbnail_returns_none_for_undecodable_bytes() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let result = store
            .store_thumbnail(Bytes::from_static(b"DICM\x00\x01\x02"), "series.dcm")
            .await
            .unwrap();
        assert!(result.is_none());

        let thumbs: Vec<_> = std::fs::read_dir(store.root().join("thumbs"))
            .unwrap()
            .collect();
        assert!(thumbs.is_empty());
    }

    #[tokio::test]
    async fn store_thumbnail_encodes_bounded_jpeg() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let asset = store
            .store_thumbnail(Bytes::from(png_bytes(400, 300)), "scan.png")
            .await
            .unwrap()
            .expect("png should produce a thumbnail");
        assert!(!asset.inline);
        assert!(asset.url.starts_with("/media/thumbs/"), "url: {}", asset.url);
        assert!(asset.url.ends_with(".jpg"), "url: {}", asset.url);

        let jpeg = std::fs::read(asset_path(&store, &asset.url)).unwrap();
        let thumb = image::load_from_memory(&jpeg).unwrap();
        // Aus 400x300 wird 200x150, das Seitenverhaeltnis bleibt erhalten.
        assert_eq!(thumb.width(), 200);
        assert_eq!(thumb.height(), 150);
    }

    #[test]
    fn make_thumbnail_respects_max_edge() {
        let jpeg = make_thumbnail(&png_bytes(400, 300), 64, 70).unwrap();
        let thumb = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(thumb.width(), 64);
        assert_eq!(thumb.height(), 48);
    }

    #[test]
    fn make_thumbnail_rejects_garbage() {
        assert!(make_thumbnail(b"not an image", 64, 70).is_err());
    }

    #[test]
    fn data_url_prefixes_mime_and_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"abc");
        assert_eq!(data_url("image/png", b"abc"), format!("data:image/png;base64,{}", encoded));
        assert!(data_url("", b"abc").starts_with("data:application/octet-stream;base64,"));
    }

    #[tokio::test]
    async fn remove_asset_deletes_stored_file() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let asset = store
            .store_original(Bytes::from_static(b"bytes"), "scan.png", "image/png")
            .await
            .unwrap();
        let path = asset_path(&store, &asset.url);
        assert!(path.exists());

        store.remove_asset(&asset.url).await;
        assert!(!path.exists());

        // Zweiter Aufruf ist ein No-op.
        store.remove_asset(&asset.url).await;
    }

    #[tokio::test]
    async fn remove_asset_ignores_foreign_urls() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let sentinel = tmp.path().join("outside.txt");
        std::fs::write(&sentinel, b"keep me").unwrap();

        store.remove_asset("https://example.com/media/scans/x.png").await;
        store.remove_asset("data:image/png;base64,AAAA").await;
        store.remove_asset("/media/other/x.png").await;
        store.remove_asset("/media/scans/../../outside.txt").await;

        assert!(sentinel.exists());
    }
}
