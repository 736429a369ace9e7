//! File-per-key storage backend.
//!
//! Each key becomes one `.json` file in a flat directory. Key characters that
//! are unsafe in file names are percent-escaped so that keys can be recovered
//! from directory listings.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use idev_types::{non_empty, ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.json", escape(key)))
	}
}

fn escape(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for c in key.chars() {
		match c {
			'%' => out.push_str("%25"),
			'/' => out.push_str("%2F"),
			':' => out.push_str("%3A"),
			'\\' => out.push_str("%5C"),
			c => out.push(c),
		}
	}
	out
}

fn unescape(name: &str) -> String {
	name.replace("%3A", ":")
		.replace("%2F", "/")
		.replace("%5C", "\\")
		.replace("%25", "%")
}

fn backend_err(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(non_empty)],
			vec![],
		)
		.validate(config)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.path_for(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(backend_err)?;

		// Write-then-rename so readers never observe a partial file.
		let path = self.path_for(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value).await.map_err(backend_err)?;
		fs::rename(&temp_path, &path).await.map_err(backend_err)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.path_for(key)).await.map_err(backend_err)
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut dir = match fs::read_dir(&self.base_path).await {
			Ok(dir) => dir,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_err(e)),
		};

		let mut keys = Vec::new();
		while let Some(entry) = dir.next_entry().await.map_err(backend_err)? {
			let name = entry.file_name();
			let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
				continue;
			};
			let key = unescape(stem);
			if key.starts_with(prefix) {
				keys.push(key);
			}
		}
		Ok(keys)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema.validate(config)?;
	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("path is required".into()))?;
	tracing::debug!(path, "Using file storage backend");
	Ok(Box::new(FileStorage::new(PathBuf::from(path))))
}
