//! Connector working directories.
//!
//! Each connector owns `<type_dir>/<connector_name>`. On creation the type's
//! instance prototype is extracted into it; on removal the prototype is only
//! deleted if it still matches the original byte for byte, so edits made by
//! an operator survive. Failures here never abort removal.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use super::{INSTANCE_PROTOTYPE_FILE, TypeInfo};
use crate::error::{CoordinatorError, Result};

/// Create (or adopt) the working directory for `name` and extract the
/// instance prototype into it.
pub async fn make_connector_directory(
    name: &str,
    type_info: &TypeInfo,
) -> Result<PathBuf> {
    let connector_dir = type_info.connector_dir(name);

    match fs::metadata(&connector_dir).await {
        Ok(meta) if meta.is_dir() => {
            warn!(
                target: "conduit::workdir",
                connector = %name,
                dir = %connector_dir.display(),
                "connector directory already exists"
            );
        }
        Ok(_) => {
            return Err(CoordinatorError::instantiation(
                name,
                format!(
                    "existing file blocks creation of connector directory at {}",
                    connector_dir.display()
                ),
            ));
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(&connector_dir).await.map_err(|err| {
                CoordinatorError::instantiation(
                    name,
                    format!(
                        "can't create connector directory at {}: {err}",
                        connector_dir.display()
                    ),
                )
            })?;
        }
        Err(err) => {
            return Err(CoordinatorError::instantiation(
                name,
                format!(
                    "can't inspect connector directory at {}: {err}",
                    connector_dir.display()
                ),
            ));
        }
    }

    extract_prototype(name, &connector_dir, type_info).await;
    Ok(connector_dir)
}

async fn extract_prototype(
    name: &str,
    connector_dir: &Path,
    type_info: &TypeInfo,
) {
    let Some(prototype) = type_info.instance_prototype() else {
        return;
    };
    let target = connector_dir.join(INSTANCE_PROTOTYPE_FILE);
    if fs::try_exists(&target).await.unwrap_or(false) {
        return;
    }
    if let Err(err) = fs::write(&target, prototype.as_bytes()).await {
        warn!(
            target: "conduit::workdir",
            connector = %name,
            dir = %connector_dir.display(),
            error = %err,
            "can't extract instance prototype"
        );
    }
}

/// Remove the working directory. Anything the connector or an operator left
/// behind keeps the directory in place; that is logged, not returned.
pub async fn remove_connector_directory(
    name: &str,
    connector_dir: &Path,
    type_info: &TypeInfo,
) {
    let prototype_file = connector_dir.join(INSTANCE_PROTOTYPE_FILE);
    if let Some(prototype) = type_info.instance_prototype()
        && fs::try_exists(&prototype_file).await.unwrap_or(false)
    {
        match fs::read(&prototype_file).await {
            Ok(contents) if contents == prototype.as_bytes() => {
                if let Err(err) = fs::remove_file(&prototype_file).await {
                    warn!(
                        target: "conduit::workdir",
                        connector = %name,
                        error = %err,
                        "can't delete instance prototype"
                    );
                }
            }
            Ok(_) => {
                debug!(
                    target: "conduit::workdir",
                    connector = %name,
                    "instance prototype was modified; leaving it in place"
                );
            }
            Err(err) => {
                warn!(
                    target: "conduit::workdir",
                    connector = %name,
                    error = %err,
                    "can't read instance prototype"
                );
            }
        }
    }

    if fs::try_exists(connector_dir).await.unwrap_or(false)
        && let Err(err) = fs::remove_dir(connector_dir).await
    {
        warn!(
            target: "conduit::workdir",
            connector = %name,
            dir = %connector_dir.display(),
            error = %err,
            "can't delete connector directory; this connector may be difficult to delete"
        );
    }
}
