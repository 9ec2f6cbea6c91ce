//! Local passthrough: entries with an on-disk source read from disk

use bytes::Bytes;
use embedfs::{
    BundleWriter, Config, DirNode, EmbedError, EmbeddedFs, FileNode, FileOptions, FileServer,
};
use http::{header, Request, StatusCode};
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn fixture(dir: &TempDir) -> EmbeddedFs {
    let disk = dir.path().join("page.html");
    fs::write(&disk, b"<p>edited on disk</p>").unwrap();

    let mut writer = BundleWriter::new();
    writer
        .add_file_with(
            "/page.html",
            b"<p>embedded</p>",
            FileOptions {
                local: Some(disk.display().to_string()),
                ..FileOptions::default()
            },
        )
        .unwrap();
    writer
        .add_file_with(
            "/gone.txt",
            b"still embedded",
            FileOptions {
                local: Some(dir.path().join("gone.txt").display().to_string()),
                ..FileOptions::default()
            },
        )
        .unwrap();
    writer.add_file("/embedded-only.txt", b"no source").unwrap();
    writer.into_fs().unwrap()
}

fn read(fs: &EmbeddedFs, path: &str) -> embedfs::Result<Vec<u8>> {
    let mut file = fs.open(path)?;
    let mut out = Vec::new();
    file.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn test_toggle_local_mode() {
    let dir = TempDir::new().unwrap();
    let store = fixture(&dir);

    assert_eq!(read(&store, "/page.html").unwrap(), b"<p>embedded</p>");

    store.use_local(true);
    assert!(store.is_local());
    assert_eq!(read(&store, "/page.html").unwrap(), b"<p>edited on disk</p>");
    assert!(store.open("/page.html").unwrap().is_local());

    // Entries without a source stay embedded
    assert_eq!(read(&store, "/embedded-only.txt").unwrap(), b"no source");

    // A missing source is a missing file
    assert!(matches!(store.open("/gone.txt"), Err(EmbedError::NotFound(_))));

    store.use_local(false);
    assert_eq!(read(&store, "/gone.txt").unwrap(), b"still embedded");
}

#[test]
fn test_local_directory_listing() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.txt"), b"b").unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();

    let store = EmbeddedFs::new();
    store
        .add_directory(DirNode::new("/").with_local(&dir.path().display().to_string()))
        .unwrap();
    store.use_local(true);

    let names: Vec<(String, bool)> = store
        .open("/")
        .unwrap()
        .readdir(-1)
        .unwrap()
        .iter()
        .map(|e| (e.name().to_string(), e.is_dir()))
        .collect();
    assert_eq!(
        names,
        vec![("a".to_string(), true), ("b.txt".to_string(), false)]
    );
}

#[test]
fn test_server_serves_disk_copy() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        local: true,
        ..Config::default()
    };
    let store = fixture(&dir);
    store.use_local(config.local);
    let server = FileServer::with_config(Arc::new(store), &config);

    let req = Request::builder()
        .uri("/page.html")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(())
        .unwrap();
    let resp = server.handle(&req);
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body(), &Bytes::from_static(b"<p>edited on disk</p>"));
    assert!(!resp.headers().contains_key(header::CONTENT_ENCODING));
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");

    let req = Request::builder().uri("/gone.txt").body(()).unwrap();
    assert_eq!(server.handle(&req).status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_with_config_sets_local() {
    let store = EmbeddedFs::with_config(&Config {
        local: true,
        ..Config::default()
    });
    assert!(store.is_local());
    store
        .add_file(FileNode::new("/x", Bytes::from_static(b"x")))
        .unwrap();
    assert_eq!(read(&store, "/x").unwrap(), b"x");
}
