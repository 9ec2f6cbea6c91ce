//! Concurrent readers, writers and HTTP handling over one shared store

use embedfs::{BundleWriter, EmbeddedFs, FileServer};
use http::{header, Request, StatusCode};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::thread;

fn content(seed: usize) -> Vec<u8> {
    (0..20_000).map(|i| ((i * 7 + seed) % 26) as u8 + b'a').collect()
}

fn fixture(files: usize) -> Arc<EmbeddedFs> {
    let mut writer = BundleWriter::new();
    for i in 0..files {
        writer
            .add_file(&format!("/data/file{:02}.txt", i), &content(i))
            .unwrap();
    }
    Arc::new(writer.into_fs().unwrap())
}

#[test]
fn test_independent_handles_on_one_file() {
    let fs = fixture(1);
    let expected = Arc::new(content(0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let fs = Arc::clone(&fs);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                let mut file = fs.open("/data/file00.txt").unwrap();
                for round in 0..20u64 {
                    let offset = (round * 997 + t * 131) % 19_000;
                    file.seek(SeekFrom::Start(offset)).unwrap();
                    let mut buf = [0u8; 64];
                    file.read_exact(&mut buf).unwrap();
                    let start = offset as usize;
                    assert_eq!(&buf[..], &expected[start..start + 64]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_writes_during_reads() {
    let fs = fixture(4);

    let writer = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || {
            for i in 0..50 {
                fs.write(&format!("/new/{}/entry.txt", i), format!("{}", i).as_bytes())
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                for _ in 0..25 {
                    let mut out = Vec::new();
                    fs.open(&format!("/data/file{:02}.txt", i))
                        .unwrap()
                        .read_to_end(&mut out)
                        .unwrap();
                    assert_eq!(out, content(i));
                    // Listing the root while it gains children must not fail
                    fs.open("/").unwrap().readdir(-1).unwrap();
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    for i in 0..50 {
        let info = fs.stat(&format!("/new/{}/entry.txt", i)).unwrap();
        assert_eq!(info.string().unwrap(), i.to_string());
    }
    assert_eq!(fs.open("/new").unwrap().readdir(-1).unwrap().len(), 50);
}

#[test]
fn test_parallel_requests() {
    let server = Arc::new(FileServer::new(fixture(6)));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let path = format!("/data/file{:02}.txt", i);
                for gzip in [true, false] {
                    let mut builder = Request::builder().uri(path.as_str());
                    if gzip {
                        builder = builder.header(header::ACCEPT_ENCODING, "gzip");
                    }
                    let resp = server.handle(&builder.body(()).unwrap());
                    assert_eq!(resp.status(), StatusCode::OK);
                    assert_eq!(resp.headers().contains_key(header::CONTENT_ENCODING), gzip);
                    if !gzip {
                        assert_eq!(resp.body().as_ref(), content(i).as_slice());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
