use cairn_primitives::TransactionSigned;
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};
use tracing::{debug, warn};

/// Disk journal for locally submitted transactions.
///
/// Locals are the node operator's own transactions; losing them on restart
/// is user-visible, so they are appended here as they arrive and replayed
/// through full validation on startup. Journal damage is never fatal: broken
/// tails are dropped with a warning.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
}

impl Journal {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads all parseable entries.
    pub(crate) fn load(&self) -> Vec<TransactionSigned> {
        let Ok(file) = File::open(&self.path) else { return Vec::new() };
        let mut reader = BufReader::new(file);
        let mut out = Vec::new();
        loop {
            match bincode::deserialize_from::<_, TransactionSigned>(&mut reader) {
                Ok(tx) => out.push(tx),
                Err(err) => {
                    // EOF lands here too; a torn tail only loses that entry.
                    debug!(target: "txpool", %err, loaded = out.len(), "journal read finished");
                    break
                }
            }
        }
        out
    }

    /// Appends one transaction.
    pub(crate) fn append(&self, tx: &TransactionSigned) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                bincode::serialize_into(&mut writer, tx)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                writer.flush()
            });
        if let Err(err) = result {
            warn!(target: "txpool", %err, "failed to journal local transaction");
        }
    }

    /// Rewrites the journal to exactly the given set.
    pub(crate) fn rotate<'a>(&self, txs: impl Iterator<Item = &'a TransactionSigned>) {
        let result = File::create(&self.path).and_then(|file| {
            let mut writer = BufWriter::new(file);
            for tx in txs {
                bincode::serialize_into(&mut writer, tx)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            }
            writer.flush()
        });
        if let Err(err) = result {
            warn!(target: "txpool", %err, "failed to rotate transaction journal");
        }
    }
}
