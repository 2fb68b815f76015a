use serde::{Deserialize, Serialize};

/// Name parts shared by one recording and its crops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNaming {
    pub base_name: String,
    pub device_name: String,
    pub index: u32,
}

impl FileNaming {
    pub fn new(base_name: impl Into<String>, device_name: impl Into<String>, index: u32) -> Self {
        Self {
            base_name: base_name.into(),
            device_name: device_name.into(),
            index,
        }
    }

    fn stem(&self) -> String {
        format!("{}.{}{:06}", self.base_name, self.device_name, self.index)
    }

    /// `<base>.<device><index:06>.<ext>`
    pub fn master_file(&self, extension: &str) -> String {
        format!("{}.{extension}", self.stem())
    }

    /// `<base>.<device><index:06>_<offset:05>.<ext>`
    pub fn crop_file(&self, offset: usize, extension: &str) -> String {
        format!("{}_{offset:05}.{extension}", self.stem())
    }
}
