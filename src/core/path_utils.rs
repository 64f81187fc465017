/*
 * Locations of the editor's own per-user files: the local configuration
 * directory (last opened document) and the log file written next to it.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

const LOG_FILENAME: &str = "scoring_model.log";

/*
 * Returns the platform-specific local (non-roaming) configuration directory
 * for `app_name`, creating it if necessary. `None` when no home directory can
 * be determined or the directory cannot be created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving config dir for '{app_name}'");
    let proj_dirs = ProjectDirs::from("", "", app_name)?;
    let config_path = proj_dirs.config_local_dir();
    if !config_path.exists() {
        if let Err(e) = fs::create_dir_all(config_path) {
            log::error!("PathUtils: Failed to create config directory {config_path:?}: {e}");
            return None;
        }
        log::debug!("PathUtils: Created config directory: {config_path:?}");
    }
    Some(config_path.to_path_buf())
}

pub fn get_log_file_path(app_name: &str) -> Option<PathBuf> {
    get_base_app_config_local_dir(app_name).map(|dir| dir.join(LOG_FILENAME))
}
