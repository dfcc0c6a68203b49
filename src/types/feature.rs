use color_eyre::eyre;
use color_eyre::eyre::eyre;
use geojson::JsonObject;
use serde::{Deserialize, Serialize};

/// Properties that are attached to the track feature of a processed route
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Track length in metres
    pub distance: f64,
    pub coordinate_properties: CoordinateProperties,
}

/// Per-coordinate values, index aligned with the LineString
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CoordinateProperties {
    pub elevation: Vec<f64>,
}

/// For converting FeatureProperties to geojson properties
impl TryInto<JsonObject> for FeatureProperties {
    type Error = eyre::Error;

    fn try_into(self) -> Result<JsonObject, Self::Error> {
        let value = serde_json::to_value(self)?;
        let properties = value
            .as_object()
            .ok_or(eyre!("Couldn't create object for properties"))?;
        Ok(properties.to_owned())
    }
}
