//! Per-episode record files.
//!
//! One CSV file per episode, one row per transition, written incrementally
//! while the episode runs and finalized once with the backward
//! discounted-return column. Every field of the in-memory transition
//! round-trips through the file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::transition::{discounted_returns, Transition};

const HEADER: &str =
    "step,velocity,x,y,z,yaw,distance,collisions,tx,ty,tz,steer,gas_brake,action_idx,state_value,reward,done,q";
const N_COLUMNS: usize = 18;

/// Record persistence failures.
#[derive(Debug)]
pub enum RecordError {
    Io(io::Error),
    /// A row could not be decoded.
    Parse { line: usize, msg: String },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Io(e) => write!(f, "record IO error: {}", e),
            RecordError::Parse { line, msg } => {
                write!(f, "record parse error at line {}: {}", line, msg)
            }
        }
    }
}

impl std::error::Error for RecordError {}

impl From<io::Error> for RecordError {
    fn from(e: io::Error) -> Self {
        RecordError::Io(e)
    }
}

/// One decoded row of a record file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub step: usize,
    pub velocity: f32,
    pub location: [f32; 3],
    pub yaw: f32,
    pub distance: f32,
    pub collisions: u32,
    pub target_offset: [f32; 3],
    pub steer: f32,
    pub gas_brake: f32,
    pub action_idx: Option<u32>,
    pub state_value: Option<f32>,
    pub reward: f32,
    pub done: bool,
    pub q: Option<f32>,
}

impl RecordRow {
    fn from_transition(t: &Transition) -> Self {
        Self {
            step: t.state.step,
            velocity: t.state.velocity,
            location: t.state.location,
            yaw: t.state.yaw,
            distance: t.state.distance_to_target,
            collisions: t.state.collisions,
            target_offset: t.state.target_offset,
            steer: t.action.control.steer,
            gas_brake: t.action.control.gas_brake,
            action_idx: t.action.index,
            state_value: t.action.state_value,
            reward: t.reward,
            done: t.is_terminal(),
            q: None,
        }
    }

    /// Training feature vector, same layout as `VehicleState::features`.
    pub fn features(&self) -> [f32; crate::core::state::OBS_SIZE] {
        [
            self.velocity,
            self.location[0],
            self.location[1],
            self.location[2],
            self.distance,
            self.target_offset[0],
            self.target_offset[1],
            self.target_offset[2],
        ]
    }

    fn to_line(&self) -> String {
        let opt_u32 = |v: Option<u32>| v.map(|x| x.to_string()).unwrap_or_default();
        let opt_f32 = |v: Option<f32>| v.map(|x| x.to_string()).unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.step,
            self.velocity,
            self.location[0],
            self.location[1],
            self.location[2],
            self.yaw,
            self.distance,
            self.collisions,
            self.target_offset[0],
            self.target_offset[1],
            self.target_offset[2],
            self.steer,
            self.gas_brake,
            opt_u32(self.action_idx),
            opt_f32(self.state_value),
            self.reward,
            self.done as u8,
            opt_f32(self.q),
        )
    }

    fn parse(line: &str, line_no: usize) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != N_COLUMNS {
            return Err(RecordError::Parse {
                line: line_no,
                msg: format!("expected {} columns, got {}", N_COLUMNS, fields.len()),
            });
        }

        fn num<T: std::str::FromStr>(s: &str, line: usize, field: &str) -> Result<T, RecordError> {
            s.parse().map_err(|_| RecordError::Parse {
                line,
                msg: format!("bad value `{}` for {}", s, field),
            })
        }
        fn opt<T: std::str::FromStr>(
            s: &str,
            line: usize,
            field: &str,
        ) -> Result<Option<T>, RecordError> {
            if s.is_empty() {
                Ok(None)
            } else {
                num(s, line, field).map(Some)
            }
        }

        Ok(Self {
            step: num(fields[0], line_no, "step")?,
            velocity: num(fields[1], line_no, "velocity")?,
            location: [
                num(fields[2], line_no, "x")?,
                num(fields[3], line_no, "y")?,
                num(fields[4], line_no, "z")?,
            ],
            yaw: num(fields[5], line_no, "yaw")?,
            distance: num(fields[6], line_no, "distance")?,
            collisions: num(fields[7], line_no, "collisions")?,
            target_offset: [
                num(fields[8], line_no, "tx")?,
                num(fields[9], line_no, "ty")?,
                num(fields[10], line_no, "tz")?,
            ],
            steer: num(fields[11], line_no, "steer")?,
            gas_brake: num(fields[12], line_no, "gas_brake")?,
            action_idx: opt(fields[13], line_no, "action_idx")?,
            state_value: opt(fields[14], line_no, "state_value")?,
            reward: num(fields[15], line_no, "reward")?,
            done: num::<u8>(fields[16], line_no, "done")? != 0,
            q: opt(fields[17], line_no, "q")?,
        })
    }
}

/// Incremental writer for one episode's record file.
pub struct RecordWriter {
    path: std::path::PathBuf,
    file: BufWriter<File>,
    rows: Vec<RecordRow>,
}

impl RecordWriter {
    /// Create the record file and write its header.
    pub fn create(path: impl Into<std::path::PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = BufWriter::new(File::create(&path)?);
        writeln!(file, "{}", HEADER)?;
        file.flush()?;
        Ok(Self {
            path,
            file,
            rows: Vec::new(),
        })
    }

    /// Append one transition; the row is on disk when this returns.
    pub fn append(&mut self, transition: &Transition) -> io::Result<()> {
        let row = RecordRow::from_transition(transition);
        writeln!(self.file, "{}", row.to_line())?;
        self.file.flush()?;
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows written so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finalize the record: compute backward discounted returns over the
    /// recorded rewards and rewrite the file with the `q` column filled.
    ///
    /// Returns the computed returns, earliest step first.
    pub fn finalize(mut self, gamma: f32) -> io::Result<Vec<f32>> {
        drop(self.file);
        let rewards: Vec<f32> = self.rows.iter().map(|r| r.reward).collect();
        let returns = discounted_returns(&rewards, gamma);
        for (row, &q) in self.rows.iter_mut().zip(returns.iter()) {
            row.q = Some(q);
        }
        write_rows(&self.path, &self.rows)?;
        Ok(returns)
    }
}

fn write_rows(path: &Path, rows: &[RecordRow]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{}", HEADER)?;
    for row in rows {
        writeln!(file, "{}", row.to_line())?;
    }
    file.flush()
}

/// Read a whole record file.
pub fn read_record(path: &Path) -> Result<Vec<RecordRow>, RecordError> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i == 0 {
            // Header row.
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        rows.push(RecordRow::parse(&line, i + 1)?);
    }
    Ok(rows)
}

/// Recompute the `q` column of an existing record file from its rewards.
///
/// Idempotent: rerunning on an already-finalized file yields identical
/// returns, since they are a pure function of the rewards and discount.
pub fn update_returns(path: &Path, gamma: f32) -> Result<Vec<f32>, RecordError> {
    let mut rows = read_record(path)?;
    let rewards: Vec<f32> = rows.iter().map(|r| r.reward).collect();
    let returns = discounted_returns(&rewards, gamma);
    for (row, &q) in rows.iter_mut().zip(returns.iter()) {
        row.q = Some(q);
    }
    write_rows(path, &rows)?;
    Ok(returns)
}
