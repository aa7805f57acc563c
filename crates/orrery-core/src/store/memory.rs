use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::error::StoreError;
use crate::pipeline::{NewPipelineProcess, PipelineProcess};
use crate::process::{check_transition, AsyncProcess, NewProcess, ProcessId, Status};

use super::models::{
    DataProduct, DataProductGroup, DataProductId, GroupId, NewDataProduct, NewReducedDatum,
    ReducedDatum, ReducedDatumId, Target, TargetId,
};
use super::Store;

/// Pipeline columns stored alongside the base process row.
#[derive(Clone, Debug)]
struct PipelineRow {
    pipeline: String,
    input_files: Vec<DataProductId>,
    group: Option<GroupId>,
    logs: String,
    flags_json: Option<String>,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    targets: BTreeMap<TargetId, Target>,
    products: BTreeMap<DataProductId, DataProduct>,
    blobs: BTreeMap<DataProductId, Vec<u8>>,
    reduced: BTreeMap<ReducedDatumId, ReducedDatum>,
    groups: BTreeMap<GroupId, DataProductGroup>,
    processes: BTreeMap<ProcessId, AsyncProcess>,
    pipelines: BTreeMap<ProcessId, PipelineRow>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_process(&mut self, new: NewProcess) -> Result<AsyncProcess, StoreError> {
        if self
            .processes
            .values()
            .any(|p| p.identifier == new.identifier)
        {
            return Err(StoreError::DuplicateIdentifier(new.identifier));
        }
        if let Some(target) = new.target {
            self.target(target)?;
        }
        let now = Utc::now();
        let process = AsyncProcess {
            id: ProcessId(self.next_id()),
            identifier: new.identifier,
            status: Status::Pending,
            created: now,
            terminal_timestamp: None,
            failure_message: String::new(),
            target: new.target,
            last_update: now,
        };
        self.processes.insert(process.id, process.clone());
        Ok(process)
    }

    fn write_process(&mut self, process: &mut AsyncProcess) -> Result<(), StoreError> {
        let previous = self
            .processes
            .get(&process.id)
            .ok_or(StoreError::NotFound {
                kind: "process",
                id: process.id.0,
            })?;
        check_transition(previous, process, Utc::now())?;
        self.processes.insert(process.id, process.clone());
        Ok(())
    }

    fn target(&self, id: TargetId) -> Result<&Target, StoreError> {
        self.targets.get(&id).ok_or(StoreError::NotFound {
            kind: "target",
            id: id.0,
        })
    }

    fn product(&self, id: DataProductId) -> Result<&DataProduct, StoreError> {
        self.products.get(&id).ok_or(StoreError::NotFound {
            kind: "data product",
            id: id.0,
        })
    }

    fn group(&self, id: GroupId) -> Result<&DataProductGroup, StoreError> {
        self.groups.get(&id).ok_or(StoreError::NotFound {
            kind: "group",
            id: id.0,
        })
    }
}

/// [`Store`] kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for MemoryStore {
    fn create_target(&self, identifier: &str, name: &str) -> Result<Target, StoreError> {
        let mut t = self.write();
        let target = Target {
            id: TargetId(t.next_id()),
            identifier: identifier.to_string(),
            name: name.to_string(),
        };
        t.targets.insert(target.id, target.clone());
        Ok(target)
    }

    fn get_target(&self, id: TargetId) -> Result<Target, StoreError> {
        self.read().target(id).cloned()
    }

    fn create_data_product(&self, new: NewDataProduct) -> Result<DataProduct, StoreError> {
        let mut t = self.write();
        if let Some(target) = new.target {
            t.target(target)?;
        }
        let product = DataProduct {
            id: DataProductId(t.next_id()),
            product_id: new.product_id,
            target: new.target,
            tag: new.tag,
            filename: new.filename,
            groups: BTreeSet::new(),
        };
        t.blobs.insert(product.id, new.data);
        t.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn get_data_product(&self, id: DataProductId) -> Result<DataProduct, StoreError> {
        self.read().product(id).cloned()
    }

    fn save_data_product(&self, product: &DataProduct) -> Result<(), StoreError> {
        let mut t = self.write();
        t.product(product.id)?;
        for group in &product.groups {
            t.group(*group)?;
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    fn delete_data_product(&self, id: DataProductId) -> Result<(), StoreError> {
        let mut t = self.write();
        t.product(id)?;
        t.products.remove(&id);
        t.blobs.remove(&id);
        Ok(())
    }

    fn read_data(&self, id: DataProductId) -> Result<Vec<u8>, StoreError> {
        self.read().blobs.get(&id).cloned().ok_or(StoreError::NotFound {
            kind: "data file",
            id: id.0,
        })
    }

    fn data_products_for_target(&self, target: TargetId) -> Vec<DataProduct> {
        self.read()
            .products
            .values()
            .filter(|p| p.target == Some(target))
            .cloned()
            .collect()
    }

    fn data_products_in_group(&self, group: GroupId) -> Vec<DataProduct> {
        self.read()
            .products
            .values()
            .filter(|p| p.groups.contains(&group))
            .cloned()
            .collect()
    }

    fn create_reduced_datum(&self, new: NewReducedDatum) -> Result<ReducedDatum, StoreError> {
        let mut t = self.write();
        t.target(new.target)?;
        let datum = ReducedDatum {
            id: ReducedDatumId(t.next_id()),
            target: new.target,
            data_type: new.data_type,
            source_name: new.source_name,
            timestamp: new.timestamp,
            value: new.value,
        };
        t.reduced.insert(datum.id, datum.clone());
        Ok(datum)
    }

    fn delete_reduced_datum(&self, id: ReducedDatumId) -> Result<(), StoreError> {
        self.write()
            .reduced
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                kind: "reduced datum",
                id: id.0,
            })
    }

    fn reduced_data_for_target(&self, target: TargetId) -> Vec<ReducedDatum> {
        self.read()
            .reduced
            .values()
            .filter(|d| d.target == target)
            .cloned()
            .collect()
    }

    fn create_group(&self, name: &str) -> Result<DataProductGroup, StoreError> {
        let mut t = self.write();
        let group = DataProductGroup {
            id: GroupId(t.next_id()),
            name: name.to_string(),
        };
        t.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn get_group(&self, id: GroupId) -> Result<DataProductGroup, StoreError> {
        self.read().group(id).cloned()
    }

    fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        let mut t = self.write();
        t.group(id)?;
        t.groups.remove(&id);
        for product in t.products.values_mut() {
            product.groups.remove(&id);
        }
        for row in t.pipelines.values_mut() {
            if row.group == Some(id) {
                row.group = None;
            }
        }
        Ok(())
    }

    fn groups(&self) -> Vec<DataProductGroup> {
        self.read().groups.values().cloned().collect()
    }

    fn create_process(&self, new: NewProcess) -> Result<AsyncProcess, StoreError> {
        self.write().insert_process(new)
    }

    fn get_process(&self, id: ProcessId) -> Result<AsyncProcess, StoreError> {
        self.read()
            .processes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "process",
                id: id.0,
            })
    }

    fn save_process(&self, process: &mut AsyncProcess) -> Result<(), StoreError> {
        self.write().write_process(process)
    }

    fn processes(&self) -> Vec<AsyncProcess> {
        self.read().processes.values().cloned().collect()
    }

    fn processes_for_target(&self, target: TargetId) -> Vec<AsyncProcess> {
        let mut found: Vec<AsyncProcess> = self
            .read()
            .processes
            .values()
            .filter(|p| p.target == Some(target))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        found
    }

    fn create_pipeline(&self, new: NewPipelineProcess) -> Result<PipelineProcess, StoreError> {
        let mut t = self.write();
        for id in &new.input_files {
            t.product(*id)?;
        }
        let process = t.insert_process(NewProcess {
            identifier: new.identifier,
            target: new.target,
        })?;
        let row = PipelineRow {
            pipeline: new.pipeline,
            input_files: new.input_files,
            group: None,
            logs: String::new(),
            flags_json: new.flags_json,
        };
        t.pipelines.insert(process.id, row.clone());
        Ok(join(process, row))
    }

    fn get_pipeline(&self, id: ProcessId) -> Result<PipelineProcess, StoreError> {
        let t = self.read();
        let not_found = StoreError::NotFound {
            kind: "pipeline process",
            id: id.0,
        };
        let process = t.processes.get(&id).ok_or(not_found.clone())?;
        let row = t.pipelines.get(&id).ok_or(not_found)?;
        Ok(join(process.clone(), row.clone()))
    }

    fn save_pipeline(&self, pipeline: &mut PipelineProcess) -> Result<(), StoreError> {
        let mut t = self.write();
        let id = pipeline.process.id;
        let input_files = t
            .pipelines
            .get(&id)
            .map(|row| row.input_files.clone())
            .ok_or(StoreError::NotFound {
                kind: "pipeline process",
                id: id.0,
            })?;
        if let Some(group) = pipeline.group {
            t.group(group)?;
        }
        t.write_process(&mut pipeline.process)?;
        pipeline.input_files = input_files.clone();
        t.pipelines.insert(
            id,
            PipelineRow {
                pipeline: pipeline.pipeline.clone(),
                input_files,
                group: pipeline.group,
                logs: pipeline.logs.clone(),
                flags_json: pipeline.flags_json.clone(),
            },
        );
        Ok(())
    }
}

fn join(process: AsyncProcess, row: PipelineRow) -> PipelineProcess {
    PipelineProcess {
        process,
        pipeline: row.pipeline,
        input_files: row.input_files,
        group: row.group,
        logs: row.logs,
        flags_json: row.flags_json,
    }
}
