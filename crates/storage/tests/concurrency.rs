use std::collections::HashSet;
use std::thread;

use storage::{FileContextStore, StorageBackend, Value};
use uuid::Uuid;

const THREADS: usize = 8;
const KEYS_PER_THREAD: usize = 20;

#[test]
fn concurrent_saves_to_one_context_lose_nothing() -> Result<(), anyhow::Error> {
    let dir = std::env::temp_dir().join(format!("storage_concurrency_{}", Uuid::new_v4()));
    let store = FileContextStore::new();
    store.initialize(&dir)?;

    thread::scope(|s| {
        for t in 0..THREADS {
            let store = &store;
            s.spawn(move || {
                for i in 0..KEYS_PER_THREAD {
                    store
                        .save("shared", &format!("t{t}-k{i}"), Value::from(i as i64))
                        .expect("save");
                }
            });
        }
    });

    let keys = store.list_keys("shared")?;
    assert_eq!(keys.len(), THREADS * KEYS_PER_THREAD);
    assert_eq!(store.load("shared", "t3-k7")?, Some(Value::from(7)));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn different_contexts_do_not_interfere() -> Result<(), anyhow::Error> {
    let dir = std::env::temp_dir().join(format!("storage_concurrency_{}", Uuid::new_v4()));
    let store = FileContextStore::new();
    store.initialize(&dir)?;

    thread::scope(|s| {
        for t in 0..THREADS {
            let store = &store;
            s.spawn(move || {
                let context = format!("ctx{t}");
                for i in 0..KEYS_PER_THREAD {
                    store.save(&context, &format!("k{i}"), Value::from(t as i64)).expect("save");
                }
                store.delete_key(&context, "k0").expect("delete key");
            });
        }
    });

    let expected: HashSet<String> = (0..THREADS).map(|t| format!("ctx{t}")).collect();
    assert_eq!(store.list_contexts()?, expected);
    for t in 0..THREADS {
        let context = format!("ctx{t}");
        assert_eq!(store.list_keys(&context)?.len(), KEYS_PER_THREAD - 1);
        assert_eq!(store.load(&context, "k1")?, Some(Value::from(t as i64)));
    }

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
