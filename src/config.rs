use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::storage;
use crate::storage::garage::{GarageBuilder, GarageConf};
use crate::storage::in_memory::MemBuilder;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "storage_driver")]
pub enum StorageConfig {
    Garage(GarageStorageConfig),
    InMemory,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GarageStorageConfig {
    pub s3_endpoint: String,
    pub aws_region: String,
    pub bucket: String,

    // set both for local development; ambient credentials otherwise
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IngestConfig {
    /// Top-level document collection holding one record per recipient.
    #[serde(default = "default_recipient_collection")]
    pub recipient_collection: String,

    /// Per-recipient sub-collection receiving one metadata document per
    /// message.
    #[serde(default = "default_metadata_subcollection")]
    pub metadata_subcollection: String,

    /// When set, the archival stage is the sole handler: it signals final
    /// acceptance instead of passing control to the metadata stage.
    #[serde(default)]
    pub archive_only: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recipient_collection: default_recipient_collection(),
            metadata_subcollection: default_metadata_subcollection(),
            archive_only: false,
        }
    }
}

impl StorageConfig {
    pub fn builder(&self) -> storage::Builder {
        match self {
            StorageConfig::Garage(conf) => GarageBuilder::new(GarageConf {
                region: conf.aws_region.clone(),
                s3_endpoint: conf.s3_endpoint.clone(),
                bucket: conf.bucket.clone(),
                aws_access_key_id: conf.aws_access_key_id.clone(),
                aws_secret_access_key: conf.aws_secret_access_key.clone(),
            }),
            StorageConfig::InMemory => MemBuilder::new("mailstash"),
        }
    }
}

pub fn read_config(config_file: PathBuf) -> Result<Config> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

fn default_recipient_collection() -> String {
    "recipients".into()
}

fn default_metadata_subcollection() -> String {
    "messages".into()
}
