use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use twm_config::{MappingFileConfig, MappingSetting};
use twm_mangle::{
    AllocatorOptions, DumpStatus, MangleContext, MappingCallback, MappingOutput, MappingPlan,
    MappingRecord, NameAllocator, TokenInventory,
};

fn attributed_context() -> MangleContext {
    let allocator = NameAllocator::new(AllocatorOptions::default()).unwrap();
    let mut inventory = TokenInventory::new();
    inventory.extend_file("src/App.vue", ["bg-red-500", "font-bold"]);
    inventory.extend_file("src/Card.vue", ["bg-red-500"]);
    MangleContext::new(allocator, &inventory)
}

fn explode() -> anyhow::Result<()> {
    panic!("callback exploded")
}

#[test]
fn file_report_is_a_json_array_with_used_by() {
    let tmp = tempfile::tempdir().unwrap();
    let setting = MappingSetting::Config(MappingFileConfig {
        file: Some("reports/map.json".into()),
    });
    let plan = MappingOutput::from(&setting).resolve(tmp.path());
    let context = attributed_context();

    assert_eq!(context.dump(&plan), DumpStatus::Written { records: 2 });

    let bytes = std::fs::read(tmp.path().join("reports/map.json")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        value,
        serde_json::json!([
            {
                "original": "bg-red-500",
                "mangled": "tw-a",
                "usedBy": ["src/App.vue", "src/Card.vue"],
            },
            {
                "original": "font-bold",
                "mangled": "tw-b",
                "usedBy": ["src/App.vue"],
            },
        ])
    );
}

#[test]
fn unwritable_report_path_is_contained() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"file, not a directory").unwrap();
    let plan = MappingPlan::File(blocker.join("map.json"));

    assert_eq!(attributed_context().dump(&plan), DumpStatus::Failed);
}

#[test]
fn sync_callback_receives_records_in_allocation_order() {
    let seen: Arc<Mutex<Vec<MappingRecord>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let plan = MappingPlan::Callback(MappingCallback::sync(move |records| {
        sink.lock().unwrap().extend_from_slice(records);
        Ok(())
    }));

    assert_eq!(
        attributed_context().dump(&plan),
        DumpStatus::Written { records: 2 }
    );
    let originals: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|record| record.original.clone())
        .collect();
    assert_eq!(originals, vec!["bg-red-500", "font-bold"]);
}

#[test]
fn async_callback_needs_the_async_dump() {
    let plan = MappingPlan::Callback(MappingCallback::from_async(|_| async { Ok::<(), anyhow::Error>(()) }));
    assert_eq!(attributed_context().dump(&plan), DumpStatus::Failed);
}

#[tokio::test]
async fn async_callback_runs_and_panics_are_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let plan = MappingPlan::Callback(MappingCallback::from_async(move |records| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(records.len(), Ordering::SeqCst);
            Ok::<(), anyhow::Error>(())
        }
    }));
    let context = attributed_context();
    assert_eq!(
        context.dump_async(&plan).await,
        DumpStatus::Written { records: 2 }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let panicking = MappingPlan::Callback(MappingCallback::from_async(|_| async { explode() }));
    assert_eq!(context.dump_async(&panicking).await, DumpStatus::Failed);

    let failing = MappingPlan::Callback(MappingCallback::from_async(|_| async {
        Err::<(), _>(anyhow::anyhow!("sink unavailable"))
    }));
    assert_eq!(context.dump_async(&failing).await, DumpStatus::Failed);
}

#[tokio::test]
async fn async_file_dump_matches_sync_dump() {
    let tmp = tempfile::tempdir().unwrap();
    let context = attributed_context();
    let sync_path = tmp.path().join("sync.json");
    let async_path = tmp.path().join("async.json");

    context.dump(&MappingPlan::File(sync_path.clone()));
    assert_eq!(
        context.dump_async(&MappingPlan::File(async_path.clone())).await,
        DumpStatus::Written { records: 2 }
    );
    assert_eq!(
        std::fs::read(sync_path).unwrap(),
        std::fs::read(async_path).unwrap()
    );
}
