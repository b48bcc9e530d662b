//! Temporary sysfs trees for tests.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

use super::sysfs::SysfsRoot;

pub(crate) struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> SysfsRoot {
        SysfsRoot::new(self.dir.path())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn append(&self, relative: &str, contents: &str) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.path(relative))
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    /// Writes a battery supply; `values` are `POWER_SUPPLY_*` suffixes.
    pub fn battery(&self, name: &str, status: &str, values: &[(&str, i64)]) {
        let base = format!("class/power_supply/{name}");
        self.write(&format!("{base}/type"), "Battery\n");

        let mut uevent = format!("POWER_SUPPLY_NAME={name}\nPOWER_SUPPLY_STATUS={status}\n");
        for (key, value) in values {
            uevent.push_str(&format!("POWER_SUPPLY_{key}={value}\n"));
        }
        self.write(&format!("{base}/uevent"), &uevent);
    }

    pub fn ac(&self, name: &str, online: bool) {
        let base = format!("class/power_supply/{name}");
        self.write(&format!("{base}/type"), "Mains\n");
        self.write(&format!("{base}/online"), if online { "1\n" } else { "0\n" });
    }

    pub fn backlight(&self, name: &str, brightness: i64, max: i64) {
        let base = format!("class/backlight/{name}");
        self.write(&format!("{base}/brightness"), &format!("{brightness}\n"));
        self.write(&format!("{base}/max_brightness"), &format!("{max}\n"));
    }

    pub fn cpufreq(&self, cpu: u32, files: &[(&str, &str)]) {
        for (name, value) in files {
            self.write(
                &format!("devices/system/cpu/cpu{cpu}/cpufreq/{name}"),
                &format!("{value}\n"),
            );
        }
    }
}
