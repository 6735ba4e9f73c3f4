use std::collections::BTreeMap;

use fitmirror_core::config::ConnectConfig;
use fitmirror_core::Representation;

use crate::ConnectError;

const LOGIN_URL: &str = "https://sso.garmin.com/sso/login";
const LOGIN_SERVICE: &str = "https://connect.garmin.com/post-auth/login";
const CLIENT_ID: &str = "GarminConnect";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/535.2 (KHTML, like Gecko) Chrome/15.0.874.121 Safari/535.2";
const ACTIVITIES_URL: &str = "http://connect.garmin.com/proxy/activity-search-service-1.2/json/activities?start={start}&limit={limit}";

/// Endpoints and templates used by [`crate::ConnectClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectSettings {
    pub login_url: String,
    pub login_service: String,
    pub client_id: String,
    pub user_agent: String,
    pub activities_url: String,
    /// Download template per derived format; `{activityId}` and any other
    /// top-level field of the listed activity may appear as placeholders.
    pub representations: BTreeMap<Representation, String>,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        let representations = BTreeMap::from([
            (
                Representation::OrigZip,
                "https://connect.garmin.com/proxy/download-service/files/activity/{activityId}"
                    .to_string(),
            ),
            (
                Representation::Tcx,
                "https://connect.garmin.com/proxy/activity-service-1.1/tcx/activity/{activityId}?full=true"
                    .to_string(),
            ),
            (
                Representation::Gpx,
                "https://connect.garmin.com/proxy/activity-service-1.1/gpx/activity/{activityId}?full=true"
                    .to_string(),
            ),
            (
                Representation::Kml,
                "https://connect.garmin.com/proxy/activity-service-1.0/kml/activity/{activityId}?full=true"
                    .to_string(),
            ),
            (
                Representation::Csv,
                "https://connect.garmin.com/csvExporter/{activityId}.csv".to_string(),
            ),
        ]);
        Self {
            login_url: LOGIN_URL.to_string(),
            login_service: LOGIN_SERVICE.to_string(),
            client_id: CLIENT_ID.to_string(),
            user_agent: USER_AGENT.to_string(),
            activities_url: ACTIVITIES_URL.to_string(),
            representations,
        }
    }
}

impl ConnectSettings {
    /// Defaults overridden by whatever the `[connect]` section sets.
    pub fn from_config(cfg: &ConnectConfig) -> Result<Self, ConnectError> {
        let mut settings = Self::default();
        if let Some(v) = &cfg.login_url {
            settings.login_url = v.clone();
        }
        if let Some(v) = &cfg.login_service {
            settings.login_service = v.clone();
        }
        if let Some(v) = &cfg.client_id {
            settings.client_id = v.clone();
        }
        if let Some(v) = &cfg.user_agent {
            settings.user_agent = v.clone();
        }
        if let Some(v) = &cfg.activities_url {
            settings.activities_url = v.clone();
        }
        for (ext, template) in &cfg.representations {
            let repr = Representation::from_extension(ext)
                .filter(|r| !r.is_canonical())
                .ok_or_else(|| ConnectError::InvalidSetting(format!("unknown format '{ext}'")))?;
            settings.representations.insert(repr, template.clone());
        }
        settings.check()?;
        Ok(settings)
    }

    /// Point every endpoint at `base` (scheme + host), keeping paths and queries.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let mut settings = Self::default();
        settings.login_url = format!("{base}/sso/login");
        settings.login_service = format!("{base}/post-auth/login");
        settings.activities_url =
            format!("{base}/proxy/activity-search-service-1.2/json/activities?start={{start}}&limit={{limit}}");
        for template in settings.representations.values_mut() {
            if let Some(idx) = template.find("/proxy/").or_else(|| template.find("/csvExporter/")) {
                *template = format!("{base}{}", &template[idx..]);
            }
        }
        settings
    }

    fn check(&self) -> Result<(), ConnectError> {
        if !self.activities_url.contains("{start}") || !self.activities_url.contains("{limit}") {
            return Err(ConnectError::InvalidSetting(
                "activities_url must contain {start} and {limit}".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn listing_url(&self, offset: usize, count: usize) -> String {
        self.activities_url
            .replace("{start}", &offset.to_string())
            .replace("{limit}", &count.to_string())
    }
}
