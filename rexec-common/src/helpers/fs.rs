use std::os::unix::prelude::PermissionsExt;
use std::path::Path;

/// Creates the directory if needed and restricts it to the current user.
pub fn ensure_private_directory<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    std::fs::create_dir_all(path.as_ref())?;
    secure_directory(path)
}

pub fn secure_directory<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    std::fs::set_permissions(path.as_ref(), std::fs::Permissions::from_mode(0o700))
}

pub fn secure_file<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    std::fs::set_permissions(path.as_ref(), std::fs::Permissions::from_mode(0o600))
}
