//! Binary network files.
//!
//! Layout (bincode, fixed-width little-endian integers):
//! a [`Header`] carrying magic bytes and a format version, followed by the
//! layer records in chain order. Chain links are positional; nothing else is
//! stored. Weights are written as raw `f64`, so a save/load cycle is bit exact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::Options;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::network::Network;

const MAGIC: [u8; 4] = *b"INNW";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Serialize)]
struct LayerRecordRef<'a> {
    rows: u64,
    cols: u64,
    weights: &'a [f64],
    learning_rate: f64,
    weight_decay: f64,
}

#[derive(Deserialize)]
struct LayerRecord {
    rows: u64,
    cols: u64,
    weights: Vec<f64>,
    learning_rate: f64,
    weight_decay: f64,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Writes `network` to `writer`.
pub fn write_network<W: Write>(
    network: &Network,
    mut writer: W,
) -> Result<(), PersistenceError> {
    let header = Header { magic: MAGIC, version: FORMAT_VERSION };
    codec().serialize_into(&mut writer, &header)?;

    let records: Vec<LayerRecordRef<'_>> = network
        .layers()
        .iter()
        .map(|layer| LayerRecordRef {
            rows: layer.weights().rows() as u64,
            cols: layer.weights().cols() as u64,
            weights: layer.weights().as_slice(),
            learning_rate: layer.learning_rate(),
            weight_decay: layer.weight_decay(),
        })
        .collect();
    codec().serialize_into(&mut writer, &records)?;
    writer.flush()?;
    Ok(())
}

/// Reads a network from `reader`, which must hold exactly one network file.
pub fn read_network<R: Read>(mut reader: R) -> Result<Network, PersistenceError> {
    let header: Header = codec().deserialize_from(&mut reader)?;
    if header.magic != MAGIC {
        return Err(PersistenceError::BadMagic);
    }
    if header.version != FORMAT_VERSION {
        return Err(PersistenceError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: header.version,
        });
    }

    let records: Vec<LayerRecord> = codec().deserialize_from(&mut reader)?;
    let mut extra = [0u8; 1];
    if reader.read(&mut extra)? != 0 {
        return Err(PersistenceError::InvalidFormat("trailing bytes after last layer".into()));
    }
    into_network(records)
}

fn into_network(records: Vec<LayerRecord>) -> Result<Network, PersistenceError> {
    if records.is_empty() {
        return Err(PersistenceError::InvalidFormat("no layers".into()));
    }
    let mut layers = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let rows = to_usize(record.rows, index)?;
        let cols = to_usize(record.cols, index)?;
        if rows == 0 || cols == 0 {
            return Err(PersistenceError::InvalidFormat(format!(
                "layer {index} has empty shape {rows}x{cols}"
            )));
        }
        let found = record.weights.len();
        let weights = Matrix::from_row_major(rows, cols, record.weights).ok_or_else(|| {
            PersistenceError::InvalidFormat(format!(
                "layer {index} declares {rows}x{cols} but holds {found} weights"
            ))
        })?;
        layers.push(Layer::from_weights(weights, record.learning_rate, record.weight_decay));
    }
    Network::from_layers(layers).map_err(|e| PersistenceError::InvalidFormat(e.to_string()))
}

fn to_usize(value: u64, index: usize) -> Result<usize, PersistenceError> {
    usize::try_from(value).map_err(|_| {
        PersistenceError::InvalidFormat(format!("layer {index} dimension {value} too large"))
    })
}

/// Saves `network` to `path`, creating parent directories as needed.
///
/// The file is written beside the target and renamed over it, so an
/// interrupted save never clobbers a previous good file. A failed save
/// removes its staging file.
pub fn save<P: AsRef<Path>>(network: &Network, path: P) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");

    let staged = File::create(&staging)
        .map_err(PersistenceError::from)
        .and_then(|file| write_network(network, BufWriter::new(file)))
        .and_then(|()| fs::rename(&staging, path).map_err(PersistenceError::from));
    if let Err(e) = staged {
        if let Err(cleanup) = fs::remove_file(&staging) {
            warn!("could not remove {}: {cleanup}", Path::new(&staging).display());
        }
        return Err(e);
    }
    info!("saved network {:?} to {}", network.layer_shapes(), path.display());
    Ok(())
}

/// Loads a network from `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Network, PersistenceError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let network = read_network(BufReader::new(file))?;
    info!("loaded network {:?} from {}", network.layer_shapes(), path.display());
    Ok(network)
}
