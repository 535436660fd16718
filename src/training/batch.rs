//! Episode-file batching.
//!
//! Training consumes whole episode files, `batch_size` at a time. Files are
//! discovered recursively, sorted for a stable base order, then shuffled
//! with a seeded generator so an epoch's batch composition is reproducible.
//! Only exact-size batches are produced; the remainder is dropped.

use std::io;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Collect every `.csv` record file under `dir`, recursively.
pub fn discover_records(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    Ok(())
}

/// Shuffle the record files under `dir` and split them into exact-size
/// batches. With `n` files, yields `n / batch_size` batches; the last
/// `n % batch_size` files are left out of this epoch.
pub fn build_batches(dir: &Path, batch_size: usize, seed: u64) -> io::Result<Vec<Vec<PathBuf>>> {
    if batch_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "batch_size must be > 0",
        ));
    }

    let mut files = discover_records(dir)?;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    files.shuffle(&mut rng);

    let n_batches = files.len() / batch_size;
    files.truncate(n_batches * batch_size);

    Ok(files
        .chunks_exact(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect())
}
