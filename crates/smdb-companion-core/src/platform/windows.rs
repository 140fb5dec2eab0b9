use std::ffi::OsString;
use std::path::{Component, Path};
use std::process::Command;

/// `explorer /select,<path>` wants a plain path without the verbatim prefix.
pub fn reveal_command(path: &Path) -> Command {
    let mut select = OsString::from("/select,");
    select.push(strip_verbatim(path));
    let mut cmd = Command::new("explorer");
    cmd.arg(select);
    cmd
}

fn strip_verbatim(path: &Path) -> OsString {
    let mut components = path.components();
    if let Some(Component::Prefix(prefix)) = components.next() {
        if let std::path::Prefix::VerbatimDisk(letter) = prefix.kind() {
            let mut plain = OsString::from(format!("{}:\\", letter as char));
            plain.push(components.skip(1).collect::<std::path::PathBuf>().as_os_str());
            return plain;
        }
    }
    path.as_os_str().to_os_string()
}
