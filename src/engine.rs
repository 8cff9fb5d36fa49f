use crate::{utils, Protocol, Result};

/// A snapshot of one configured crypto engine.
///
/// Upstream documentation:
/// [`gpgme_engine_info_t`](https://www.gnupg.org/documentation/manuals/gpgme/Engine-Information.html#index-gpgme_005fengine_005finfo_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub protocol: Protocol,
    pub path: Option<String>,
    pub version: Option<String>,
    pub required_version: Option<String>,
    pub home_dir: Option<String>,
}

impl EngineInfo {
    unsafe fn from_raw(raw: ffi::gpgme_engine_info_t) -> Result<Self> {
        let info = &*raw;
        Ok(EngineInfo {
            protocol: Protocol::from_raw(info.protocol),
            path: utils::copy_str(info.file_name)?,
            version: utils::copy_str(info.version)?,
            required_version: utils::copy_str(info.req_version)?,
            home_dir: utils::copy_str(info.home_dir)?,
        })
    }

    /// Copies every entry of an engine info list, preserving its order.
    pub(crate) unsafe fn collect(mut raw: ffi::gpgme_engine_info_t) -> Result<Vec<EngineInfo>> {
        let mut infos = Vec::new();
        while !raw.is_null() {
            infos.push(EngineInfo::from_raw(raw)?);
            raw = (*raw).next;
        }
        Ok(infos)
    }
}
