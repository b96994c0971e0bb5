pub mod accumulator;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod partitioned;
pub mod storage;
pub mod table;
pub mod versioned;

pub use accumulator::SnapshotAccumulator;
pub use dataset::{FileDataset, TableStore};
pub use error::{DatasetError, Result};
pub use loader::ResilientLoader;
pub use partitioned::{combine, Partition, PartitionSet, PartitionedDataset};
pub use storage::{Compression, DatasetStorage, Format};
pub use versioned::{Version, VersionedDataset};
