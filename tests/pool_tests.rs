#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::time::Duration;

use bytes::Bytes;
use random_access_file::{HandleState, Pool, RandomAccessFile};

use common::{options_in, wait_for_state};

async fn count_states(files: &[RandomAccessFile]) -> (usize, usize, usize) {
    let mut open = 0;
    let mut suspended = 0;
    let mut closed = 0;
    for file in files {
        match file.state().await {
            HandleState::Open => open += 1,
            HandleState::Suspended => suspended += 1,
            HandleState::Closed => closed += 1,
        }
    }
    (open, suspended, closed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pool_keeps_exactly_capacity_open() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(3);
    let files: Vec<_> = (0..10)
        .map(|i| {
            RandomAccessFile::new(
                format!("f{i}.bin"),
                options_in(dir.path()).with_pool(pool.clone()),
            )
        })
        .collect();

    for (i, file) in files.iter().enumerate() {
        file.write(0, format!("file number {i}")).await.unwrap();
    }

    assert_eq!(pool.active_count(), 3);
    assert_eq!(count_states(&files).await, (3, 7, 0));

    // Every handle still answers, reopening transparently.
    for (i, file) in files.iter().enumerate() {
        let expected = format!("file number {i}");
        let got = file.read(0, expected.len()).await.unwrap();
        assert_eq!(got, Bytes::from(expected));
    }

    assert_eq!(pool.active_count(), 3);
    assert_eq!(count_states(&files).await, (3, 7, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_and_drop_release_slots() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(4);
    let a = RandomAccessFile::new("a.bin", options_in(dir.path()).with_pool(pool.clone()));
    let b = RandomAccessFile::new("b.bin", options_in(dir.path()).with_pool(pool.clone()));
    let c = RandomAccessFile::new("c.bin", options_in(dir.path()).with_pool(pool.clone()));

    for file in [&a, &b, &c] {
        file.open().await.unwrap();
    }
    assert_eq!(pool.active_count(), 3);

    a.close().await.unwrap();
    assert_eq!(pool.active_count(), 2);

    drop(b);
    assert_eq!(pool.active_count(), 1);

    c.destroy().await.unwrap();
    assert_eq!(pool.active_count(), 0);

    // Reopening rejoins.
    a.read(0, 0).await.unwrap();
    assert_eq!(pool.active_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_reopen_does_not_double_register() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(2);
    let file = RandomAccessFile::new("twice.bin", options_in(dir.path()).with_pool(pool.clone()));

    file.open().await.unwrap();
    file.open().await.unwrap();
    file.open().await.unwrap();
    assert_eq!(pool.active_count(), 1);
    assert_eq!(file.state().await, HandleState::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_capacity_is_clamped_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(0);
    assert_eq!(pool.max_active(), 1);

    let a = RandomAccessFile::new("a.bin", options_in(dir.path()).with_pool(pool.clone()));
    let b = RandomAccessFile::new("b.bin", options_in(dir.path()).with_pool(pool.clone()));
    a.write(0, "a").await.unwrap();
    b.write(0, "b").await.unwrap();

    assert_eq!(pool.active_count(), 1);
    assert_eq!(a.state().await, HandleState::Suspended);
    assert_eq!(b.state().await, HandleState::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_after_suspend_does_not_truncate() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(1);
    let sized = RandomAccessFile::new(
        "sized.bin",
        options_in(dir.path())
            .with_pool(pool.clone())
            .with_size(16),
    );
    let other = RandomAccessFile::new("other.bin", options_in(dir.path()).with_pool(pool.clone()));

    sized.write(0, "0123456789abcdef0123").await.unwrap();
    other.open().await.unwrap();
    assert_eq!(sized.state().await, HandleState::Suspended);

    assert_eq!(sized.stat().await.unwrap().size, 20);
    assert_eq!(&sized.read(16, 4).await.unwrap()[..], b"0123");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn suspension_drops_cached_pages() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(1);
    let cached = RandomAccessFile::new("cached.bin", options_in(dir.path()).with_pool(pool.clone()));
    cached.write(0, "before").await.unwrap();
    assert_eq!(&cached.read(0, 6).await.unwrap()[..], b"before");

    // Change the bytes behind the handle's back while it is suspended.
    let writer = RandomAccessFile::new("cached.bin", options_in(dir.path()).with_pool(pool.clone()));
    writer.write(0, "after!").await.unwrap();
    assert_eq!(cached.state().await, HandleState::Suspended);

    assert_eq!(&cached.read(0, 6).await.unwrap()[..], b"after!");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_handles_settle_within_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(2);
    let files: Vec<_> = (0..12)
        .map(|i| {
            RandomAccessFile::new(
                format!("c{i}.bin"),
                options_in(dir.path()).with_pool(pool.clone()),
            )
        })
        .collect();

    let tasks: Vec<_> = files
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, file)| {
            tokio::spawn(async move {
                for round in 0..8u8 {
                    let payload = vec![round; 100 + i];
                    file.write(0, payload.clone()).await.unwrap();
                    assert_eq!(file.read(0, payload.len()).await.unwrap(), Bytes::from(payload));
                }
            })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert!(pool.active_count() <= 2);

    // Deferred suspensions of busy handles land shortly after.
    for _ in 0..200 {
        let (open, _, _) = count_states(&files).await;
        if open == pool.active_count() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (open, suspended, closed) = count_states(&files).await;
    assert_eq!(open, pool.active_count());
    assert_eq!(open + suspended, 12);
    assert_eq!(closed, 0);

    for (i, file) in files.iter().enumerate() {
        let got = file.read(0, 100 + i).await.unwrap();
        assert!(got.iter().all(|b| *b == 7));
    }
    wait_for_state(&files[11], HandleState::Open).await;
}
