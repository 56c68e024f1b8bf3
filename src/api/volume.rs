use crate::api::{build_uri, force_params};
use crate::error::Result;
use crate::transport::HttpTransport;
use crate::types::VolumeName;

/// Docker API for volume operations
pub struct VolumeApi<'a> {
    http: &'a dyn HttpTransport,
}

impl<'a> VolumeApi<'a> {
    pub(crate) fn new(http: &'a dyn HttpTransport) -> Self {
        Self { http }
    }

    /// Delete a volume, forcing the removal when `force` is set
    pub fn delete(&self, name: &VolumeName, force: bool) -> Result<()> {
        let uri = build_uri(&format!("/volumes/{}", name), force_params(force));
        self.http.delete(&uri)?;
        tracing::debug!(volume = %name, force, "Deleted volume");
        Ok(())
    }
}
