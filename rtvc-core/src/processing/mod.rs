pub mod block_segmenter;
pub mod sizing;
