use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of a [`Target`].
    TargetId
);
id_type!(
    /// Primary key of a [`DataProduct`].
    DataProductId
);
id_type!(
    /// Primary key of a [`ReducedDatum`].
    ReducedDatumId
);
id_type!(
    /// Primary key of a [`DataProductGroup`].
    GroupId
);

/// The astronomical object a set of observations concerns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub identifier: String,
    pub name: String,
}

/// A stored data file, e.g. one FITS frame or an encoded timelapse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataProduct {
    pub id: DataProductId,
    pub product_id: String,
    pub target: Option<TargetId>,
    pub tag: Option<String>,
    /// Name of the stored data file.
    pub filename: String,
    pub groups: BTreeSet<GroupId>,
}

#[derive(Clone, Debug, Default)]
pub struct NewDataProduct {
    pub product_id: String,
    pub target: Option<TargetId>,
    pub tag: Option<String>,
    pub filename: String,
    pub data: Vec<u8>,
}

/// One time-series measurement attached to a target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducedDatum {
    pub id: ReducedDatumId,
    pub target: TargetId,
    pub data_type: Option<String>,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct NewReducedDatum {
    pub target: TargetId,
    pub data_type: Option<String>,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

/// A named collection of data products.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataProductGroup {
    pub id: GroupId,
    pub name: String,
}
