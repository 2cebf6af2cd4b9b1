/// PLY reader and writer module.
pub mod ply;
