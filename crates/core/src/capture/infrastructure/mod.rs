pub mod ffmpeg_camera_source;
pub mod image_directory_source;
