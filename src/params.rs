use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameters of a generation task.
///
/// An open-ended mapping of named generation settings. Nothing is required
/// client-side; the server validates. At most one of `media_id` /
/// `mask_media_id`-style pairs is meaningful per slot, also enforced
/// server-side.
///
/// # Example
/// ```
/// use pixai_rs::TaskParameters;
///
/// let params = TaskParameters::new()
///     .prompts("a cat in space")
///     .negative_prompts("lowres, blurry")
///     .model_id("1648918127446573124")
///     .size(512, 512)
///     .sampling_steps(25)
///     .cfg_scale(7.5);
///
/// assert_eq!(params.width, Some(512));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Source media for img2img, by previously uploaded media id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    /// Denoising strength for img2img.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_media_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscaler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_sampler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_denoising_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_denoising_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enlarge: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enlarge_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_nets: Option<Vec<ControlNet>>,
    /// LoRA weights keyed by model id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora: Option<BTreeMap<String, f64>>,
    /// LoRA block weights keyed by block name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lbw: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latent_couple: Option<LatentCouple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynthres: Option<DynamicThresholding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animate_diff: Option<AnimateDiff>,
    #[serde(rename = "enableADetailer", skip_serializing_if = "Option::is_none")]
    pub enable_a_detailer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_skip: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vae_model_id: Option<String>,
    /// Derive settings from a previous task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_task_id: Option<String>,
}

/// One control net applied to a generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlNet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Latent couple regional prompting settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatentCouple {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divisions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

/// Dynamic thresholding (CFG mimicking) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicThresholding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimic_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_percentile: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimic_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimic_scale_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub powerscale_power: Option<f64>,
}

/// AnimateDiff animation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimateDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smooth: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2: Option<AnimateDiffV2>,
}

/// AnimateDiff v2 motion settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimateDiffV2 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoise: Option<f64>,
}

impl TaskParameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the positive prompt text.
    pub fn prompts(mut self, prompts: impl Into<String>) -> Self {
        self.prompts = Some(prompts.into());
        self
    }

    /// Set the negative prompt text.
    pub fn negative_prompts(mut self, prompts: impl Into<String>) -> Self {
        self.negative_prompts = Some(prompts.into());
        self
    }

    /// Set the generation model id.
    pub fn model_id(mut self, id: impl Into<String>) -> Self {
        self.model_id = Some(id.into());
        self
    }

    /// Set output dimensions.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set the number of sampling steps.
    pub fn sampling_steps(mut self, steps: u32) -> Self {
        self.sampling_steps = Some(steps);
        self
    }

    /// Set the sampler algorithm (e.g. "Euler a", "DPM++ 2M Karras").
    pub fn sampling_method(mut self, method: impl Into<String>) -> Self {
        self.sampling_method = Some(method.into());
        self
    }

    /// Set the classifier-free guidance scale.
    pub fn cfg_scale(mut self, cfg: f64) -> Self {
        self.cfg_scale = Some(cfg);
        self
    }

    /// Set a fixed seed. Omit for a server-chosen seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the batch size (number of images per generation).
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Use an uploaded media item as the img2img source.
    pub fn media_id(mut self, id: impl Into<String>) -> Self {
        self.media_id = Some(id.into());
        self
    }

    /// Set the img2img denoising strength.
    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Add a LoRA weight by model id.
    pub fn lora(mut self, model_id: impl Into<String>, weight: f64) -> Self {
        self.lora
            .get_or_insert_with(BTreeMap::new)
            .insert(model_id.into(), weight);
        self
    }

    /// Add a control net.
    pub fn control_net(mut self, control_net: ControlNet) -> Self {
        self.control_nets
            .get_or_insert_with(Vec::new)
            .push(control_net);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_parameters_serialize_to_empty_object() {
        let value = serde_json::to_value(TaskParameters::new()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_builder_fields_serialize_camel_case() {
        let params = TaskParameters::new()
            .prompts("a cat")
            .negative_prompts("lowres")
            .model_id("123")
            .size(512, 768)
            .sampling_steps(25)
            .cfg_scale(7.5)
            .seed(42)
            .batch_size(4);

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({
                "prompts": "a cat",
                "negativePrompts": "lowres",
                "modelId": "123",
                "width": 512,
                "height": 768,
                "samplingSteps": 25,
                "cfgScale": 7.5,
                "seed": 42,
                "batchSize": 4
            })
        );
    }

    #[test]
    fn test_control_net_and_lora() {
        let params = TaskParameters::new()
            .lora("111", 0.8)
            .lora("222", 0.5)
            .control_net(ControlNet {
                weight: Some(1.0),
                media_id: Some("m-1".into()),
                kind: Some("pose".into()),
            });

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["lora"], json!({"111": 0.8, "222": 0.5}));
        assert_eq!(
            value["controlNets"],
            json!([{"weight": 1.0, "mediaId": "m-1", "type": "pose"}])
        );
    }

    #[test]
    fn test_a_detailer_field_name() {
        let params = TaskParameters {
            enable_a_detailer: Some(true),
            ..Default::default()
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value, json!({"enableADetailer": true}));
    }

    #[test]
    fn test_nested_animate_diff() {
        let params = TaskParameters {
            animate_diff: Some(AnimateDiff {
                enabled: Some(true),
                v2: Some(AnimateDiffV2 {
                    motion_scale: Some(1.2),
                    denoise: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            json!({"animateDiff": {"enabled": true, "v2": {"motionScale": 1.2}}})
        );
    }
}
