use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_KEYPARTY_HOME: &str = ".keyparty";

pub fn default_home_dir() -> Utf8PathBuf {
    if let Some(home) = home_dir() {
        if let Some(home) = Utf8Path::from_path(&home) {
            return home.join(DEFAULT_KEYPARTY_HOME);
        }
    }

    Utf8PathBuf::from(DEFAULT_KEYPARTY_HOME)
}
