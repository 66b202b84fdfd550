pub mod onnx_image_encoder;
