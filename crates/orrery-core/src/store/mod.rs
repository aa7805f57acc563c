//! Abstract object store for targets, data products, measurements, output
//! groups and process records.
//!
//! Implementations must be internally synchronised: one store is shared by
//! every worker, and each worker only writes the process record it owns.

mod memory;
mod models;

pub use memory::MemoryStore;
pub use models::{
    DataProduct, DataProductGroup, DataProductId, GroupId, NewDataProduct, NewReducedDatum,
    ReducedDatum, ReducedDatumId, Target, TargetId,
};

use crate::error::StoreError;
use crate::pipeline::{NewPipelineProcess, PipelineProcess};
use crate::process::{AsyncProcess, NewProcess, ProcessId};

pub trait Store: Send + Sync {
    fn create_target(&self, identifier: &str, name: &str) -> Result<Target, StoreError>;
    fn get_target(&self, id: TargetId) -> Result<Target, StoreError>;

    fn create_data_product(&self, new: NewDataProduct) -> Result<DataProduct, StoreError>;
    fn get_data_product(&self, id: DataProductId) -> Result<DataProduct, StoreError>;
    /// Persist tag and group membership changes.
    fn save_data_product(&self, product: &DataProduct) -> Result<(), StoreError>;
    fn delete_data_product(&self, id: DataProductId) -> Result<(), StoreError>;
    fn read_data(&self, id: DataProductId) -> Result<Vec<u8>, StoreError>;
    fn data_products_for_target(&self, target: TargetId) -> Vec<DataProduct>;
    fn data_products_in_group(&self, group: GroupId) -> Vec<DataProduct>;

    fn create_reduced_datum(&self, new: NewReducedDatum) -> Result<ReducedDatum, StoreError>;
    fn delete_reduced_datum(&self, id: ReducedDatumId) -> Result<(), StoreError>;
    fn reduced_data_for_target(&self, target: TargetId) -> Vec<ReducedDatum>;

    fn create_group(&self, name: &str) -> Result<DataProductGroup, StoreError>;
    fn get_group(&self, id: GroupId) -> Result<DataProductGroup, StoreError>;
    fn delete_group(&self, id: GroupId) -> Result<(), StoreError>;
    fn groups(&self) -> Vec<DataProductGroup>;

    fn create_process(&self, new: NewProcess) -> Result<AsyncProcess, StoreError>;
    fn get_process(&self, id: ProcessId) -> Result<AsyncProcess, StoreError>;
    /// Write `process`, applying [`check_transition`](crate::process::check_transition)
    /// and copying the stamped fields back into it.
    fn save_process(&self, process: &mut AsyncProcess) -> Result<(), StoreError>;
    fn processes(&self) -> Vec<AsyncProcess>;
    /// Processes concerning `target`, newest first.
    fn processes_for_target(&self, target: TargetId) -> Vec<AsyncProcess>;

    fn create_pipeline(&self, new: NewPipelineProcess) -> Result<PipelineProcess, StoreError>;
    fn get_pipeline(&self, id: ProcessId) -> Result<PipelineProcess, StoreError>;
    /// Like [`Store::save_process`]; `input_files` are never rewritten.
    fn save_pipeline(&self, pipeline: &mut PipelineProcess) -> Result<(), StoreError>;
}
