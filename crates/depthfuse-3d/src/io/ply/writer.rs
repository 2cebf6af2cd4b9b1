use std::io::Write;
use std::path::Path;

use super::{PlyEncoding, PlyError, XyzProperty};
use crate::pointcloud::PointCloud;

fn write_header<W: Write>(
    writer: &mut W,
    encoding: PlyEncoding,
    vertex_count: usize,
) -> Result<(), PlyError> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format {} 1.0", encoding.keyword())?;
    writeln!(writer, "comment generated by depthfuse")?;
    writeln!(writer, "element vertex {vertex_count}")?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    writeln!(writer, "end_header")?;
    Ok(())
}

/// Serialize the points of a point cloud to a writer in PLY format.
pub fn write_ply_to<W: Write>(
    writer: &mut W,
    pointcloud: &PointCloud,
    encoding: PlyEncoding,
) -> Result<(), PlyError> {
    write_header(writer, encoding, pointcloud.len())?;

    match encoding {
        PlyEncoding::BinaryLittleEndian => {
            let config = bincode::config::standard();
            for point in pointcloud.points() {
                bincode::encode_into_std_write(XyzProperty::from(point), writer, config)?;
            }
        }
        PlyEncoding::Ascii => {
            for p in pointcloud.points() {
                writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
            }
        }
    }

    Ok(())
}

/// Write the points of a point cloud to a PLY file as `double` x/y/z vertex properties.
///
/// Example:
///
/// ```no_run
/// use depthfuse_3d::io::ply::{write_ply, PlyEncoding};
/// use depthfuse_3d::pointcloud::PointCloud;
///
/// let cloud = PointCloud::new(vec![[0.0, 0.0, 1.0]]);
/// write_ply("output.ply", &cloud, PlyEncoding::BinaryLittleEndian).unwrap();
/// ```
pub fn write_ply(
    path: impl AsRef<Path>,
    pointcloud: &PointCloud,
    encoding: PlyEncoding,
) -> Result<(), PlyError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_ply_to(&mut writer, pointcloud, encoding)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ply::read_ply;

    #[test]
    fn test_write_read_binary() -> Result<(), PlyError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cloud.ply");
        let cloud = PointCloud::new(vec![[0.1, -0.2, 3.0], [1e-9, 12345.678, -0.0]]);

        write_ply(&path, &cloud, PlyEncoding::BinaryLittleEndian)?;
        assert_eq!(read_ply(&path)?, cloud);
        Ok(())
    }

    #[test]
    fn test_write_ascii_layout() -> Result<(), PlyError> {
        let mut buffer = Vec::new();
        let cloud = PointCloud::new(vec![[1.0, 2.5, -3.0]]);
        write_ply_to(&mut buffer, &cloud, PlyEncoding::Ascii)?;

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("element vertex 1\n"));
        assert!(text.ends_with("end_header\n1 2.5 -3\n"));
        Ok(())
    }

    #[test]
    fn test_write_empty_cloud() -> Result<(), PlyError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.ply");
        write_ply(&path, &PointCloud::default(), PlyEncoding::BinaryLittleEndian)?;
        assert!(read_ply(&path)?.is_empty());
        Ok(())
    }
}
