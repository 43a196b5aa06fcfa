use url::Url;

use crate::{CoreError, WS_PATH, protocol::RemoteFile};

pub fn download_link(origin: &Url, file: &RemoteFile) -> Result<Url, CoreError> {
    Ok(origin.join(&file.download_path)?)
}

/// Link handed to other participants: the bare origin followed by the
/// file's download path.
pub fn share_link(origin: &Url, file: &RemoteFile) -> String {
    format!(
        "{}{}",
        origin.origin().ascii_serialization(),
        file.download_path
    )
}

pub fn websocket_url(origin: &Url) -> Result<Url, CoreError> {
    let scheme = match origin.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(CoreError::UnsupportedScheme(other.to_owned())),
    };
    let mut url = origin.join(WS_PATH)?;
    url.set_scheme(scheme)
        .map_err(|()| CoreError::UnsupportedScheme(scheme.to_owned()))?;
    Ok(url)
}
