use std::io::{BufRead, Read};
use std::path::Path;

use super::{PlyDataType, PlyEncoding, PlyError, PlyPropertyDefinition, XyzProperty};
use crate::pointcloud::PointCloud;

/// Upper bound on the vertices preallocated from the header count.
const MAX_PREALLOCATED_VERTICES: usize = 1 << 20;

struct PlyHeader {
    encoding: PlyEncoding,
    vertex_count: usize,
    properties: Vec<PlyPropertyDefinition>,
}

impl PlyHeader {
    fn position_of(&self, name: &str) -> Result<usize, PlyError> {
        self.properties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| PlyError::UnsupportedFormat(format!("missing vertex property {name}")))
    }

    fn record_size(&self) -> usize {
        self.properties.iter().map(|p| p.data_type.size()).sum()
    }

    fn is_xyz_double(&self) -> bool {
        self.properties == XyzProperty::definitions()
    }

    fn preallocate(&self) -> PointCloud {
        PointCloud::with_capacity(self.vertex_count.min(MAX_PREALLOCATED_VERTICES))
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut encoding = None;
    let mut vertex_count = None;
    let mut properties = Vec::new();
    let mut is_ply = false;
    // properties of elements other than `vertex` are not read
    let mut in_vertex_element = false;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::Malformed("missing end_header".to_string()));
        }
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();

        match parts.next() {
            Some("ply") => is_ply = true,
            Some("end_header") => break,
            Some("format") => {
                encoding = Some(PlyEncoding::from_keyword(parts.next().unwrap_or_default())?);
            }
            Some("element") => {
                in_vertex_element = parts.next() == Some("vertex");
                if in_vertex_element {
                    let count = parts
                        .next()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| PlyError::Malformed(trimmed.to_string()))?;
                    vertex_count = Some(count);
                }
            }
            Some("property") if in_vertex_element => {
                let data_type = parts
                    .next()
                    .ok_or_else(|| PlyError::Malformed(trimmed.to_string()))?;
                if data_type == "list" {
                    return Err(PlyError::UnsupportedFormat(trimmed.to_string()));
                }
                let name = parts
                    .next()
                    .ok_or_else(|| PlyError::Malformed(trimmed.to_string()))?;
                properties.push(PlyPropertyDefinition {
                    name: name.to_string(),
                    data_type: PlyDataType::parse(data_type)?,
                });
            }
            _ => {}
        }
    }

    if !is_ply {
        return Err(PlyError::Malformed("missing ply magic".to_string()));
    }

    Ok(PlyHeader {
        encoding: encoding.ok_or_else(|| PlyError::Malformed("missing format".to_string()))?,
        vertex_count: vertex_count
            .ok_or_else(|| PlyError::Malformed("missing vertex element".to_string()))?,
        properties,
    })
}

fn read_binary_body<R: Read>(reader: &mut R, header: &PlyHeader) -> Result<PointCloud, PlyError> {
    let mut buffer = vec![0u8; header.record_size()];
    let mut points = header.preallocate();

    // fast path for files produced by `write_ply`
    if header.is_xyz_double() {
        for _ in 0..header.vertex_count {
            reader.read_exact(&mut buffer)?;
            let (property, _): (XyzProperty, usize) =
                bincode::decode_from_slice(&buffer, bincode::config::standard())?;
            points.push(property.to_point());
        }
        return Ok(points);
    }

    let index = [
        header.position_of("x")?,
        header.position_of("y")?,
        header.position_of("z")?,
    ];
    let offsets: Vec<usize> = header
        .properties
        .iter()
        .scan(0, |offset, p| {
            let start = *offset;
            *offset += p.data_type.size();
            Some(start)
        })
        .collect();

    for _ in 0..header.vertex_count {
        reader.read_exact(&mut buffer)?;
        let mut point = [0.0; 3];
        for (value, &i) in point.iter_mut().zip(index.iter()) {
            let data_type = header.properties[i].data_type;
            let start = offsets[i];
            *value = data_type.read_le(&buffer[start..start + data_type.size()])?;
        }
        points.push(point);
    }

    Ok(points)
}

fn read_ascii_body<R: BufRead>(reader: &mut R, header: &PlyHeader) -> Result<PointCloud, PlyError> {
    let index = [
        header.position_of("x")?,
        header.position_of("y")?,
        header.position_of("z")?,
    ];
    let mut points = header.preallocate();
    let mut line = String::new();

    while points.len() < header.vertex_count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::Malformed(format!(
                "expected {} vertices, found {}",
                header.vertex_count,
                points.len()
            )));
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.is_empty() {
            continue;
        }

        let mut point = [0.0; 3];
        for (value, &i) in point.iter_mut().zip(index.iter()) {
            *value = values
                .get(i)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| PlyError::Malformed(line.trim().to_string()))?;
        }
        points.push(point);
    }

    Ok(points)
}

/// Read the vertex positions of a PLY file.
///
/// Both `ascii` and `binary_little_endian` bodies are supported; the `x`, `y` and `z`
/// properties may use any scalar type and other vertex properties are skipped.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    match header.encoding {
        PlyEncoding::BinaryLittleEndian => read_binary_body(&mut reader, &header),
        PlyEncoding::Ascii => read_ascii_body(&mut reader, &header),
    }
}
