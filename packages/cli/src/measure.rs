//! `kvbridge measure`: compare direct store access with the async handle.
//!
//! Both runs write the same random items into a fresh [`LogStore`] and read
//! them back one key at a time. The `sync` run calls the store on the current
//! thread; the `kvbridge` run goes through a [`Database`] and its worker.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use kvbridge::{Database, KeyValueStore, LogStore, OpenFlags};
use rand::Rng;
use serde::Serialize;

use crate::error::{CliError, Result};

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureConfig {
    pub items: usize,
    pub size: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            items: 10_000,
            size: 256,
        }
    }
}

impl MeasureConfig {
    fn validate(&self) -> Result<()> {
        if self.items == 0 || self.size == 0 {
            return Err(CliError::InvalidArgument(
                "--items and --size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Sync,
    Async,
}

impl Engine {
    fn name(self) -> &'static str {
        match self {
            Engine::Sync => "sync",
            Engine::Async => "kvbridge",
        }
    }
}

/// One run's result, also the JSON report format.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub name: &'static str,
    pub version: &'static str,
    pub read_throughput: f64,
    pub write_throughput: f64,
    pub items_amount: usize,
    pub object_size: usize,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl Measurement {
    pub fn summary(&self) -> String {
        format!(
            "{}: Throughput with {} items: read {:.1} ops/sec, write {:.1} ops/sec",
            self.name, self.items_amount, self.read_throughput, self.write_throughput
        )
    }
}

type Items = Vec<(Bytes, Bytes)>;

pub async fn run(config: MeasureConfig, report: Option<PathBuf>) -> Result<()> {
    let results = measure_all(config).await?;

    for result in &results {
        println!("{}", result.summary());
    }
    if let [sync, bridged] = results.as_slice() {
        println!(
            "kvbridge / sync: read {:.2}x, write {:.2}x",
            bridged.read_throughput / sync.read_throughput,
            bridged.write_throughput / sync.write_throughput
        );
    }

    if let Some(path) = report {
        serde_json::to_writer_pretty(File::create(&path)?, &results)?;
        tracing::info!(path = %path.display(), "results written");
    }
    Ok(())
}

async fn measure_all(config: MeasureConfig) -> Result<Vec<Measurement>> {
    config.validate()?;
    let dir = tempfile::tempdir()?;
    let items = generate_items(config);

    let mut results = Vec::new();
    for engine in [Engine::Sync, Engine::Async] {
        let path = dir.path().join(format!("{}.kvb", engine.name()));
        tracing::info!(engine = engine.name(), items = config.items, "measuring");
        results.push(measure(engine, config, &path, &items).await?);
    }
    Ok(results)
}

async fn measure(
    engine: Engine,
    config: MeasureConfig,
    path: &Path,
    items: &Items,
) -> Result<Measurement> {
    let (write, read, values) = match engine {
        Engine::Sync => {
            let write = write_sync(path, items)?;
            let (read, values) = read_sync(path, items)?;
            (write, read, values)
        }
        Engine::Async => {
            let write = write_async(path, items).await?;
            let (read, values) = read_async(path, items).await?;
            (write, read, values)
        }
    };

    for ((key, expected), actual) in items.iter().zip(&values) {
        if actual.as_ref() != Some(expected) {
            return Err(CliError::Mismatch {
                engine: engine.name(),
                key: String::from_utf8_lossy(key).into_owned(),
            });
        }
    }

    Ok(Measurement {
        name: engine.name(),
        version: env!("CARGO_PKG_VERSION"),
        read_throughput: throughput(config.items, read),
        write_throughput: throughput(config.items, write),
        items_amount: config.items,
        object_size: config.size,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
    })
}

fn write_sync(path: &Path, items: &Items) -> Result<Duration> {
    let mut store = LogStore::open(path, OpenFlags::create())?;
    let started = Instant::now();
    for (key, value) in items {
        store.set(key.clone(), value.clone())?;
    }
    let elapsed = started.elapsed();
    store.close()?;
    Ok(elapsed)
}

fn read_sync(path: &Path, items: &Items) -> Result<(Duration, Vec<Option<Bytes>>)> {
    let mut store = LogStore::open(path, OpenFlags::read_only())?;
    let mut values = Vec::with_capacity(items.len());
    let started = Instant::now();
    for (key, _) in items {
        values.push(store.get(key)?);
    }
    let elapsed = started.elapsed();
    store.close()?;
    Ok((elapsed, values))
}

async fn write_async(path: &Path, items: &Items) -> Result<Duration> {
    let db = kvbridge::open(path, OpenFlags::create());
    db.connect().await?;
    let started = Instant::now();
    for (key, value) in items {
        db.set(key, value.clone()).await?;
    }
    let elapsed = started.elapsed();
    db.close().await?;
    Ok(elapsed)
}

async fn read_async(path: &Path, items: &Items) -> Result<(Duration, Vec<Option<Bytes>>)> {
    let db: Database<LogStore> = kvbridge::open(path, OpenFlags::read_only());
    db.connect().await?;
    let mut values = Vec::with_capacity(items.len());
    let started = Instant::now();
    for (key, _) in items {
        values.push(db.get(key).await?);
    }
    let elapsed = started.elapsed();
    db.close().await?;
    Ok((elapsed, values))
}

fn generate_items(config: MeasureConfig) -> Items {
    let mut rng = rand::thread_rng();
    (1..=config.items)
        .map(|num| {
            let value: Vec<u8> = (0..config.size)
                .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())])
                .collect();
            (Bytes::from(format!("item-{num:010}")), Bytes::from(value))
        })
        .collect()
}

fn throughput(items: usize, elapsed: Duration) -> f64 {
    items as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
}
