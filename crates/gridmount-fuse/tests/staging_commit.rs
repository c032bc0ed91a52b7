//! Integration test: create → write → flush → release → read through GridFs
//!
//! Uses OpenDAL's in-memory backend so no live object store is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use gridmount_core::config::NamespaceMode;
use gridmount_core::{FileId, FileRecord};
use gridmount_fuse::{EntryKind, FsError, FsOptions, GridFs, HandleTable, OpenMode};
use gridmount_storage::{ChunkStore, GridStore, StoreResult};

fn memory_store(prefix: &str) -> GridStore {
    GridStore::new(
        gridmount_storage::memory_operator().expect("memory operator"),
        prefix,
    )
}

fn grid(store: impl ChunkStore + 'static, chunk_size: u32) -> GridFs {
    GridFs::new(
        Arc::new(store),
        FsOptions {
            default_chunk_size: chunk_size,
            ..FsOptions::default()
        },
    )
}

async fn put(fs: &GridFs, path: &str, content: &[u8]) {
    fs.create(path).expect("create");
    assert_eq!(fs.write(path, content, 0).expect("write"), content.len());
    fs.flush(path).await.expect("flush");
    fs.release(path, OpenMode::Write).expect("release");
}

/// Counts every mutating store call.
struct CountingStore {
    inner: GridStore,
    mutations: Arc<AtomicUsize>,
}

impl CountingStore {
    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChunkStore for CountingStore {
    async fn find_metadata(&self, filename: &str) -> StoreResult<Option<FileRecord>> {
        self.inner.find_metadata(filename).await
    }

    async fn list_metadata(&self) -> StoreResult<Vec<FileRecord>> {
        self.inner.list_metadata().await
    }

    async fn delete_object(&self, filename: &str) -> StoreResult<usize> {
        self.bump();
        self.inner.delete_object(filename).await
    }

    async fn delete_record(&self, id: FileId) -> StoreResult<()> {
        self.bump();
        self.inner.delete_record(id).await
    }

    async fn insert_chunk(&self, parent: FileId, seq: u64, data: Bytes) -> StoreResult<()> {
        self.bump();
        self.inner.insert_chunk(parent, seq, data).await
    }

    async fn insert_metadata(&self, record: &FileRecord) -> StoreResult<()> {
        self.bump();
        self.inner.insert_metadata(record).await
    }

    async fn update_metadata(&self, id: FileId, record: &FileRecord) -> StoreResult<()> {
        self.bump();
        self.inner.update_metadata(id, record).await
    }

    async fn compute_digest(&self, id: FileId) -> StoreResult<String> {
        self.inner.compute_digest(id).await
    }

    async fn read_chunk(&self, parent: FileId, seq: u64) -> StoreResult<Bytes> {
        self.inner.read_chunk(parent, seq).await
    }
}

#[tokio::test]
async fn committed_file_reads_from_chunks() {
    let fs = grid(memory_store("test/roundtrip"), 8);
    let original: Vec<u8> = (0u32..100).map(|i| (i * 7 % 251) as u8).collect();

    put(&fs, "/data.bin", &original).await;
    assert!(!fs.table().contains("data.bin"), "release drops the staged copy");

    let attr = fs.getattr("/data.bin").await.unwrap();
    assert_eq!(attr.kind, EntryKind::File);
    assert_eq!(attr.size, 100);
    assert_eq!(attr.perm, 0o555);

    assert_eq!(fs.read("/data.bin", 4096, 0).await.unwrap(), original);
    assert_eq!(fs.read("/data.bin", 10, 5).await.unwrap(), &original[5..15]);
    assert!(fs.read("/data.bin", 10, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn flush_of_clean_file_makes_no_store_calls() {
    let mutations = Arc::new(AtomicUsize::new(0));
    let store = CountingStore {
        inner: memory_store("test/clean"),
        mutations: mutations.clone(),
    };
    let fs = grid(store, 4);

    fs.create("/a.txt").unwrap();
    fs.write("/a.txt", b"hello", 0).unwrap();
    fs.flush("/a.txt").await.unwrap();
    let after_commit = mutations.load(Ordering::SeqCst);
    assert!(after_commit > 0);

    fs.flush("/a.txt").await.unwrap();
    fs.flush("/a.txt").await.unwrap();
    assert_eq!(mutations.load(Ordering::SeqCst), after_commit);
}

#[tokio::test]
async fn unflushed_create_is_listed_at_root() {
    let fs = grid(memory_store("test/listing"), 4);
    fs.create("/new.txt").unwrap();

    let names: Vec<String> = fs
        .readdir("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec![".", "..", "new.txt"]);

    let attr = fs.getattr("/new.txt").await.unwrap();
    assert_eq!(attr.perm, 0o777);
    assert_eq!(attr.size, 0);
}

#[tokio::test]
async fn rename_keeps_chunks_and_moves_name() {
    let store = memory_store("test/rename");
    let fs = grid(store.clone(), 4);
    put(&fs, "/old.txt", b"renamed payload").await;
    let before = store.find_metadata("old.txt").await.unwrap().unwrap();

    fs.rename("/old.txt", "/new.txt").await.unwrap();

    assert!(matches!(fs.getattr("/old.txt").await, Err(FsError::NotFound)));
    assert_eq!(fs.getattr("/new.txt").await.unwrap().size, 15);
    assert_eq!(fs.read("/new.txt", 64, 0).await.unwrap(), b"renamed payload");

    let after = store.find_metadata("new.txt").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.content_hash, before.content_hash);
}

#[tokio::test]
async fn concurrent_writes_to_distinct_files() {
    let fs = Arc::new(grid(memory_store("test/concurrent"), 16));

    let mut tasks = Vec::new();
    for n in 0u8..8 {
        let fs = fs.clone();
        tasks.push(tokio::spawn(async move {
            let path = format!("/file{n}.bin");
            fs.create(&path).unwrap();
            for i in 0..32u64 {
                fs.write(&path, &[n; 4], i * 4).unwrap();
            }
            fs.flush(&path).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for n in 0u8..8 {
        let path = format!("/file{n}.bin");
        assert_eq!(fs.read(&path, 256, 0).await.unwrap(), vec![n; 128]);
    }
}

#[tokio::test]
async fn stored_files_cannot_be_opened_for_writing() {
    let fs = grid(memory_store("test/open"), 4);
    put(&fs, "/ro.txt", b"locked").await;

    assert_eq!(
        fs.open("/ro.txt", libc::O_RDONLY as u32).await.unwrap(),
        OpenMode::ReadOnly
    );
    assert!(matches!(
        fs.open("/ro.txt", libc::O_WRONLY as u32).await,
        Err(FsError::AccessDenied)
    ));
    assert!(matches!(
        fs.open("/missing.txt", libc::O_RDONLY as u32).await,
        Err(FsError::NotFound)
    ));
    assert!(matches!(
        fs.write("/ro.txt", b"x", 0),
        Err(FsError::NotFound)
    ));
}

#[tokio::test]
async fn unlink_removes_stored_object() {
    let fs = grid(memory_store("test/unlink"), 4);
    put(&fs, "/gone.txt", b"bye").await;

    fs.unlink("/gone.txt").await.unwrap();
    assert!(matches!(fs.getattr("/gone.txt").await, Err(FsError::NotFound)));
    assert!(matches!(fs.unlink("/gone.txt").await, Err(FsError::NotFound)));
}

#[tokio::test]
async fn tree_namespace_exposes_nested_paths() {
    let fs = grid(memory_store("test/tree"), 4);
    put(&fs, "/docs/2024/report.txt", b"q3").await;

    assert_eq!(fs.getattr("/docs").await.unwrap().kind, EntryKind::Directory);
    assert_eq!(
        fs.getattr("/docs/2024").await.unwrap().kind,
        EntryKind::Directory
    );
    let names: Vec<String> = fs
        .readdir("/docs/2024")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec![".", "..", "report.txt"]);
    assert_eq!(fs.read("/docs/2024/report.txt", 8, 0).await.unwrap(), b"q3");
    assert!(matches!(fs.getattr("/doc").await, Err(FsError::NotFound)));
}

#[tokio::test]
async fn heuristic_namespace_treats_dotless_paths_as_directories() {
    let fs = GridFs::new(
        Arc::new(memory_store("test/heuristic")),
        FsOptions {
            namespace: NamespaceMode::Heuristic,
            ..FsOptions::default()
        },
    );
    assert_eq!(fs.getattr("/anything").await.unwrap().kind, EntryKind::Directory);
    assert!(matches!(fs.getattr("/a.txt").await, Err(FsError::NotFound)));
}

#[tokio::test]
async fn root_has_no_extended_attributes() {
    let fs = grid(memory_store("test/xattr"), 4);
    assert_eq!(
        fs.listxattr("/", 0).await.unwrap(),
        gridmount_fuse::XattrReply::Size(0)
    );
    assert!(matches!(
        fs.getxattr("/", "user.owner", 64).await,
        Err(FsError::NoAttribute)
    ));
    assert!(matches!(
        fs.setxattr("/a.txt", "user.owner", b"me"),
        Err(FsError::Unsupported)
    ));
}

#[tokio::test]
async fn getxattr_returns_nul_terminated_field() {
    let store = memory_store("test/getxattr");
    let mut record = FileRecord {
        id: FileId::new(),
        filename: "d.txt".into(),
        chunk_size: 4,
        length: 0,
        upload_time: 0,
        content_hash: String::new(),
        attributes: Default::default(),
    };
    record
        .attributes
        .insert("author".into(), serde_json::json!("ada"));
    store.insert_metadata(&record).await.unwrap();
    let fs = grid(store, 4);

    let attr = gridmount_fuse::xattr::namespace_xattr("author");
    assert_eq!(
        fs.getxattr("/d.txt", &attr, 0).await.unwrap(),
        gridmount_fuse::XattrReply::Size(4)
    );
    assert_eq!(
        fs.getxattr("/d.txt", &attr, 64).await.unwrap(),
        gridmount_fuse::XattrReply::Data(b"ada\0".to_vec())
    );
}

#[tokio::test]
async fn unlink_of_staged_only_name_keeps_staged_copy() {
    let fs = grid(memory_store("test/unlink-staged"), 4);
    fs.create("/draft.txt").unwrap();
    fs.write("/draft.txt", b"wip", 0).unwrap();

    fs.unlink("/draft.txt").await.unwrap();
    assert!(fs.table().contains("draft.txt"));
    assert_eq!(fs.read("/draft.txt", 8, 0).await.unwrap(), b"wip");
}

#[tokio::test]
async fn release_by_handle_drops_staged_file_without_kernel_path() {
    let fs = grid(memory_store("test/handles"), 4);
    let handles = HandleTable::new();

    fs.create("/tmp.txt").unwrap();
    let fh = handles.register("/tmp.txt", OpenMode::Write);
    fs.write("/tmp.txt", b"data", 0).unwrap();
    fs.flush("/tmp.txt").await.unwrap();

    // the kernel passes no path once the file is renamed or unlinked
    let handle = handles.remove(fh).unwrap();
    fs.release(&handle.path, handle.mode).unwrap();
    assert!(!fs.table().contains("tmp.txt"));
    assert!(handles.remove(fh).is_none());
}
