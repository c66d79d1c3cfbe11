/// YOLOv8 person detector using ONNX Runtime
use super::PersonDetector;
use crate::decoder::Frame;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::density::{BoundingBox, Detection};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    pub model_path: String,

    /// Confidence threshold for detections (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of detections per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Class names indexed by model class id (default: COCO 80 classes)
    #[serde(default = "default_coco_classes")]
    pub class_names: Vec<String>,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_confidence() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    300
}

fn default_input_size() -> u32 {
    640
}

fn default_coco_classes() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            class_names: default_coco_classes(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
        }
    }
}

/// Candidate box before NMS: (box, score, class id)
type Candidate = (BoundingBox, f32, usize);

/// YOLOv8 person detector
pub struct YoloV8Detector {
    config: YoloV8Config,
    session: Option<Arc<Mutex<Session>>>,
    execution_provider_used: String,
}

impl YoloV8Detector {
    pub fn new() -> Self {
        Self {
            config: YoloV8Config::default(),
            session: None,
            execution_provider_used: "CPU".to_string(),
        }
    }

    /// Resize to the model input and lay out as NCHW floats in [0, 1]
    fn preprocess(&self, frame: &Frame) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(
            frame.pixels(),
            size,
            size,
            image::imageops::FilterType::Triangle,
        );

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        input
    }

    /// Apply class-aware Non-Maximum Suppression
    fn nms(&self, mut boxes: Vec<Candidate>) -> Vec<Candidate> {
        boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut keep: Vec<Candidate> = Vec::new();
        for candidate in boxes {
            let suppressed = keep.iter().any(|kept| {
                kept.2 == candidate.2
                    && calculate_iou(&kept.0, &candidate.0) >= self.config.iou_threshold
            });
            if !suppressed {
                keep.push(candidate);
            }
        }

        keep
    }

    /// Decode a `[1, 4 + classes, predictions]` output into source-frame boxes
    fn postprocess_output(
        &self,
        output: &Array<f32, IxDyn>,
        original_width: u32,
        original_height: u32,
    ) -> Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
        }

        let scale_x = original_width as f32 / self.config.input_size as f32;
        let scale_y = original_height as f32 / self.config.input_size as f32;
        let num_classes = shape[1] - 4;
        let num_predictions = shape[2];

        let mut candidates = Vec::new();

        for i in 0..num_predictions {
            let (class_idx, score) = (0..num_classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < self.config.confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            // Unclamped corners; the density analyzer clamps to the frame
            let bbox = BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            );

            candidates.push((bbox, score, class_idx));
        }

        let detections = self
            .nms(candidates)
            .into_iter()
            .take(self.config.max_detections)
            .map(|(bbox, confidence, class_idx)| Detection {
                class: self
                    .config
                    .class_names
                    .get(class_idx)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", class_idx)),
                confidence,
                bbox,
                metadata: Some(serde_json::json!({ "class_id": class_idx })),
            })
            .collect();

        Ok(detections)
    }

    fn build_session(&self) -> Result<(Session, String)> {
        let builder = || -> Result<_> {
            Ok(Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(self.config.intra_threads)?)
        };

        let device_id = self.config.device_id;
        match self.config.execution_provider.to_uppercase().as_str() {
            "TENSORRT" => {
                let result = builder()?
                    .with_execution_providers([
                        TensorRTExecutionProvider::default().with_device_id(device_id).build(),
                        CUDAExecutionProvider::default().with_device_id(device_id).build(),
                        CPUExecutionProvider::default().build(),
                    ])?
                    .commit_from_file(&self.config.model_path);
                match result {
                    Ok(session) => return Ok((session, "TensorRT".to_string())),
                    Err(e) => tracing::warn!("Failed with TensorRT, using CPU: {}", e),
                }
            }
            "CUDA" => {
                let result = builder()?
                    .with_execution_providers([
                        CUDAExecutionProvider::default().with_device_id(device_id).build(),
                        CPUExecutionProvider::default().build(),
                    ])?
                    .commit_from_file(&self.config.model_path);
                match result {
                    Ok(session) => return Ok((session, "CUDA".to_string())),
                    Err(e) => tracing::warn!("Failed with CUDA, using CPU: {}", e),
                }
            }
            _ => {}
        }

        let session = builder()?
            .commit_from_file(&self.config.model_path)
            .with_context(|| format!("failed to load model {}", self.config.model_path))?;
        Ok((session, "CPU".to_string()))
    }
}

/// Intersection over Union of two corner boxes
fn calculate_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = BoundingBox::new(a.x1.max(b.x1), a.y1.max(b.y1), a.x2.min(b.x2), a.y2.min(b.y2));
    let intersection = inter.width() * inter.height();
    let union = a.width() * a.height() + b.width() * b.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

impl Default for YoloV8Detector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersonDetector for YoloV8Detector {
    fn id(&self) -> &'static str {
        "yolov8_detector"
    }

    fn name(&self) -> &'static str {
        "YOLOv8 Person Detector"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn class_labels(&self) -> Vec<String> {
        self.config.class_names.clone()
    }

    async fn init(&mut self, config: serde_json::Value) -> Result<()> {
        if !config.is_null() {
            self.config = serde_json::from_value(config)?;
        }

        if let Ok(provider) = std::env::var("YOLOV8_EXECUTION_PROVIDER") {
            self.config.execution_provider = provider;
        }

        let (session, provider) = self.build_session()?;
        self.session = Some(Arc::new(Mutex::new(session)));
        self.execution_provider_used = provider;

        tracing::info!(
            model = %self.config.model_path,
            provider = %self.execution_provider_used,
            confidence = self.config.confidence_threshold,
            input_size = self.config.input_size,
            "Initialized YOLOv8 detector"
        );

        Ok(())
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let session_lock = self
            .session
            .as_ref()
            .context("Model not initialized - call init() first")?;

        let input_tensor = Value::from_array(self.preprocess(frame))?;

        let output = {
            let mut session = session_lock
                .lock()
                .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let output_value = outputs.get("output0").context("No output tensor found")?;
            let (shape, data) = output_value.try_extract_tensor::<f32>()?;
            let shape: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
            Array::from_shape_vec(IxDyn(&shape), data.to_vec())?
        };

        self.postprocess_output(&output, frame.width(), frame.height())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.session.is_some())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down YOLOv8 detector");
        self.session = None;
        Ok(())
    }
}
