use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Restoration model variants the inference engine ships weights for.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RestorationModel {
    Derain,
    Defocus,
    Deblur,
}
