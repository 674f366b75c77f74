use std::{
    fs,
    path::{Path, PathBuf},
};

use lantern_logic::{ConvertError, FeatureCollection};
use log::debug;

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("artifact"));
    path.with_file_name(format!(".{name}.tmp"))
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConvertError {
    let path = path.to_path_buf();
    move |source| ConvertError::ArtifactWrite { path, source }
}

/// Write the collection to `path` all-or-nothing. The JSON is fully built in
/// memory, written next to the target and renamed over it, so readers see
/// either the old artifact or the new one.
pub fn write_artifact(path: &Path, collection: &FeatureCollection) -> Result<(), ConvertError> {
    let json = collection.to_pretty_json()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err(path))?;
    }

    let tmp = temp_path(path);
    debug!("Writing {} bytes to {}", json.len(), tmp.display());

    let res = fs::write(&tmp, json.as_bytes()).and_then(|_| fs::rename(&tmp, path));

    if let Err(why) = res {
        fs::remove_file(&tmp).ok();
        return Err(write_err(path)(why));
    }

    Ok(())
}
