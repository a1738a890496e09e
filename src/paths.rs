use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the directory where processed photos are archived: `<exe_dir>/uploads/`
pub fn get_uploads_dir() -> PathBuf {
    get_exe_dir().join("uploads")
}

/// Returns the records CSV path: `<exe_dir>/meter_records.csv`
pub fn get_records_csv() -> PathBuf {
    get_exe_dir().join("meter_records.csv")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_uploads_dir())?;
    Ok(())
}
