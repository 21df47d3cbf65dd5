//! Integration tests for LOB creation, lifecycle and sweeps.

use lobdb_core::{
    CompressionAlgorithm, Layout, LobConfig, LobContext, LobError, LobKind, LobState, LobValue,
    ObjectId, TableId,
};
use lobdb_storage::{DiskStore, FileStore, InMemoryStore};
use proptest::prelude::*;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use tempfile::tempdir;

fn memory_context(config: LobConfig) -> (Arc<InMemoryStore>, LobContext) {
    let store = Arc::new(InMemoryStore::new());
    let ctx = LobContext::open("db/test", store.clone(), config).unwrap();
    (store, ctx)
}

#[test]
fn inline_boundary() {
    let (store, ctx) = memory_context(LobConfig::default());

    for (len, inline) in [(127usize, true), (128, true), (129, false)] {
        let value = LobValue::create_blob(&vec![0xabu8; len][..], None, &ctx).unwrap();
        assert_eq!(value.is_inline(), inline, "length {len}");
        assert_eq!(value.precision(), len as u64);
    }
    assert_eq!(store.file_count(), 0, "temp value dropped");

    let text = "ä".repeat(129);
    let clob = LobValue::create_clob(text.as_bytes(), Some(129), &ctx).unwrap();
    assert!(clob.is_file_backed());
    assert_eq!(clob.read_string().unwrap(), text);
}

#[test]
fn precision_ignores_wrong_hints() {
    let (_store, ctx) = memory_context(LobConfig::default().inline_threshold(16));
    let data = vec![7u8; 100];

    let short = LobValue::create_blob(&data[..], Some(50), &ctx).unwrap();
    assert_eq!(short.precision(), 50);
    assert_eq!(short.read_bytes().unwrap(), vec![7u8; 50]);

    let long = LobValue::create_blob(&data[..], Some(1000), &ctx).unwrap();
    assert_eq!(long.precision(), 100);

    let unknown = LobValue::create_blob(&data[..], None, &ctx).unwrap();
    assert_eq!(unknown.precision(), 100);

    let clob = LobValue::create_clob("日本語テキスト".as_bytes(), Some(3), &ctx).unwrap();
    assert!(clob.is_inline());
    assert_eq!(clob.read_string().unwrap(), "日本語");
}

#[test]
fn compressed_round_trip() {
    let config = LobConfig::default()
        .blob_compression(Some(CompressionAlgorithm::zstd()))
        .clob_compression(Some(CompressionAlgorithm::zstd()));
    let (store, ctx) = memory_context(config);

    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let blob = LobValue::create_blob(&data[..], None, &ctx).unwrap();
    assert!(blob.is_compressed());
    assert!(store.size(blob.path().unwrap()).unwrap() < data.len() as u64);
    assert_eq!(blob.read_bytes().unwrap(), data);

    let text = "lorem ipsum dolor sit amet ".repeat(500);
    let clob = LobValue::create_clob(text.as_bytes(), None, &ctx).unwrap();
    let linked = clob.link(&ctx, TableId::new(1)).unwrap();
    assert!(linked.is_compressed());
    assert_eq!(linked.precision(), text.chars().count() as u64);
    assert_eq!(linked.read_string().unwrap(), text);

    let copy = linked.link(&ctx, TableId::new(2)).unwrap();
    assert!(copy.is_compressed());
    assert_eq!(copy.read_string().unwrap(), text);
}

#[test]
fn large_clob_scenario() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("test");
    let ctx = LobContext::open_on_disk(
        &base,
        LobConfig::default().inline_threshold(4096).shard_fanout(256),
    )
    .unwrap();

    let text = "abcdefghij".repeat(1000);
    let value = LobValue::create_clob(text.as_bytes(), None, &ctx).unwrap();
    assert_eq!(value.state(), LobState::Temp);
    assert_eq!(value.precision(), 10_000);

    let linked = value.link(&ctx, TableId::new(7)).unwrap();
    let path = linked.path().unwrap().to_path_buf();
    assert!(path.to_string_lossy().ends_with(".t7.lob.db"));
    assert_eq!(path, dir.path().join("test.lobs.db").join("1.t7.lob.db"));
    assert!(path.exists());
    assert_eq!(linked.read_string().unwrap(), text);

    let report = ctx.remove_all_for_table(TableId::new(7)).unwrap();
    assert_eq!(report.removed, 1);
    assert!(!path.exists());
    assert!(linked.read_bytes().is_err());
}

#[test]
fn link_is_idempotent_and_copies_on_share() {
    let (store, ctx) = memory_context(LobConfig::default());
    let value = LobValue::create_blob(&[1u8; 500][..], None, &ctx).unwrap();

    let a = value.link(&ctx, TableId::new(1)).unwrap();
    let again = a.link(&ctx, TableId::new(1)).unwrap();
    assert_eq!(a.path(), again.path());
    assert_eq!(store.file_count(), 1);

    let b = a.link(&ctx, TableId::new(2)).unwrap();
    assert_ne!(a.object_id(), b.object_id());
    assert_eq!(store.file_count(), 2);

    ctx.remove_all_for_table(TableId::new(1)).unwrap();
    assert_eq!(b.read_bytes().unwrap(), vec![1u8; 500]);
}

#[test]
fn unlink_then_relink() {
    let (store, ctx) = memory_context(LobConfig::default());
    let linked = LobValue::create_blob(&[4u8; 300][..], None, &ctx)
        .unwrap()
        .link(&ctx, TableId::new(1))
        .unwrap();
    let object_id = linked.object_id().unwrap();
    let linked_path = linked.path().unwrap().to_path_buf();
    assert_eq!(
        linked_path,
        ctx.path_for(Layout::Sharded, Some(TableId::new(1)), object_id)
    );

    let temp = linked.unlink(&ctx).unwrap();
    assert_eq!(temp.state(), LobState::Temp);
    assert_eq!(linked.state(), LobState::Removed);
    assert!(matches!(
        linked.read_bytes(),
        Err(LobError::UseAfterClose { .. })
    ));

    // Back into the table it came from
    let relinked = temp.link(&ctx, TableId::new(1)).unwrap();
    assert_eq!(relinked.state(), LobState::Linked);
    assert_eq!(relinked.object_id(), Some(object_id));
    assert_eq!(relinked.path().unwrap(), linked_path.as_path());
    assert_eq!(relinked.precision(), linked.precision());
    assert_eq!(relinked.precision(), 300);
    assert_eq!(relinked.read_bytes().unwrap(), vec![4u8; 300]);

    drop(temp);
    assert_eq!(store.file_count(), 1);
}

#[test]
fn abandoned_values_leave_no_files() {
    let (store, ctx) = memory_context(LobConfig::default());
    let value = LobValue::create_blob(&[0u8; 1000][..], None, &ctx).unwrap();
    let clone = value.clone();
    drop(value);
    assert_eq!(store.file_count(), 1, "a clone still holds the file");
    drop(clone);
    assert_eq!(store.file_count(), 0);
}

#[test]
fn failing_source_leaves_no_files() {
    struct Broken(usize);

    impl io::Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"));
            }
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }
    }

    let dir = tempdir().unwrap();
    let ctx = LobContext::open_on_disk(dir.path().join("test"), LobConfig::default()).unwrap();
    assert!(LobValue::create_blob(Broken(50_000), None, &ctx).is_err());

    let inventory = ctx.inventory().unwrap();
    assert_eq!(inventory.total_files(), 0);
}

#[test]
fn sweep_is_complete_across_shards() {
    let dir = tempdir().unwrap();
    let ctx = LobContext::open(
        dir.path().join("test"),
        Arc::new(DiskStore::new()),
        LobConfig::default().inline_threshold(8).shard_fanout(4),
    )
    .unwrap();

    let count = 4 * 3 + 5;
    let mut ids = HashSet::new();
    let mut kept = Vec::new();
    for i in 0..count {
        let table = TableId::new(if i % 3 == 0 { 2 } else { 1 });
        let value = LobValue::create_blob(&[i as u8; 32][..], None, &ctx)
            .unwrap()
            .link(&ctx, table)
            .unwrap();
        assert!(ids.insert(value.object_id().unwrap()));
        kept.push(value);
    }

    let before = ctx.inventory().unwrap();
    assert_eq!(before.total_files(), count as u64);
    assert!(before.max_depth >= 1);
    assert!(before.max_files_per_directory < 4);

    let report = ctx.remove_all_for_table(TableId::new(1)).unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.removed, 11);

    let after = ctx.inventory().unwrap();
    assert_eq!(after.total_files(), 6);
    assert_eq!(after.tables.keys().copied().collect::<Vec<_>>(), vec![TableId::new(2)]);
    for value in kept.iter().filter(|v| v.table_id() == Some(TableId::new(2))) {
        assert_eq!(value.read_bytes().unwrap().len(), 32);
    }
}

#[test]
fn purge_at_open_removes_orphans() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("test");
    {
        let ctx = LobContext::open_on_disk(&base, LobConfig::default()).unwrap();
        let value = LobValue::create_blob(&[1u8; 200][..], None, &ctx).unwrap();
        // Simulate a crash: the handle is leaked and never dropped.
        std::mem::forget(value);
    }

    let ctx = LobContext::open_on_disk(&base, LobConfig::default()).unwrap();
    assert_eq!(ctx.inventory().unwrap().temp_files, 1);
    assert_eq!(ctx.purge_temp_files().unwrap().removed, 1);
    assert_eq!(ctx.inventory().unwrap().total_files(), 0);
}

#[test]
fn legacy_flat_layout() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("test");
    let ctx = LobContext::open_on_disk(
        &base,
        LobConfig::default().inline_threshold(8).legacy_flat_naming(true),
    )
    .unwrap();

    let value = LobValue::create_blob(&[2u8; 64][..], None, &ctx).unwrap();
    assert_eq!(value.path().unwrap(), dir.path().join("test.1.temp.db"));
    let linked = value.link(&ctx, TableId::new(3)).unwrap();
    assert_eq!(linked.path().unwrap(), dir.path().join("test.3.1.lob.db"));

    // A reopened database continues after the highest id on disk
    let reopened = LobContext::open_on_disk(
        &base,
        LobConfig::default().inline_threshold(8).legacy_flat_naming(true),
    )
    .unwrap();
    let next = LobValue::create_blob(&[2u8; 64][..], None, &reopened).unwrap();
    assert_eq!(next.object_id(), Some(ObjectId::new(2)));

    let report = reopened.remove_all_for_table(TableId::new(3)).unwrap();
    assert_eq!(report.removed, 1);
    assert!(!dir.path().join("test.3.1.lob.db").exists());
}

#[test]
fn concurrent_writers_get_distinct_files() {
    let (store, ctx) = memory_context(LobConfig::default().inline_threshold(8).shard_fanout(8));
    let ctx = Arc::new(ctx);

    let values: Vec<LobValue> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let ctx = Arc::clone(&ctx);
                scope.spawn(move || {
                    (0..20)
                        .map(|_| {
                            LobValue::create_blob(&[t; 64][..], None, &ctx)
                                .unwrap()
                                .link(&ctx, TableId::new(u32::from(t)))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let ids: HashSet<ObjectId> = values.iter().filter_map(LobValue::object_id).collect();
    assert_eq!(ids.len(), 160);
    assert_eq!(store.file_count(), 160);
    for value in &values {
        let table = value.table_id().unwrap().as_u32() as u8;
        assert_eq!(value.read_bytes().unwrap(), vec![table; 64]);
    }
}

#[test]
fn conversion_keeps_content() {
    let (_store, ctx) = memory_context(LobConfig::default().inline_threshold(8));
    let clob = LobValue::create_clob("Ünïcödé payload".as_bytes(), None, &ctx).unwrap();
    let blob = clob.convert(LobKind::Binary, &ctx).unwrap();
    assert_eq!(blob.read_bytes().unwrap(), "Ünïcödé payload".as_bytes());
    assert!(blob.content_eq(&LobValue::inline_binary("Ünïcödé payload".as_bytes().to_vec())).unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_content_reads_back(data in proptest::collection::vec(any::<u8>(), 0..3000), threshold in 0u64..512) {
        let (_store, ctx) = memory_context(LobConfig::default().inline_threshold(threshold));
        let value = LobValue::create_blob(&data[..], None, &ctx).unwrap();
        prop_assert_eq!(value.is_inline(), data.len() as u64 <= threshold);
        prop_assert_eq!(value.read_bytes().unwrap(), data);
    }
}
