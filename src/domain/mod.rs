pub mod normalize;
pub mod similarity;
pub mod track;
