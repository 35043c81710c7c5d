use crate::{Dictionary, FormatError, ShapeEntry, Weights};
use std::{mem::size_of, ops::Deref, sync::Arc};
use tensor::{Storage, Tensor};

const SEGMENTS: usize = 3;
const PREFIX: usize = size_of::<u32>();

/// Splits a container into its manifest, dictionary and code segments.
///
/// Reading stops after the third segment, whatever follows is ignored.
pub fn segments(bytes: &[u8]) -> Result<[&[u8]; SEGMENTS], FormatError> {
    let mut ans = [&[][..]; SEGMENTS];
    let mut rest = bytes;
    for (i, segment) in ans.iter_mut().enumerate() {
        if rest.is_empty() {
            return Err(FormatError::MissingSegment { found: i });
        }
        let &[a, b, c, d, ..] = rest else {
            return Err(FormatError::Truncated {
                segment: i,
                needed: PREFIX,
                available: rest.len(),
            });
        };
        let len = u32::from_be_bytes([a, b, c, d]) as usize;
        rest = &rest[PREFIX..];
        if len > rest.len() {
            return Err(FormatError::Truncated {
                segment: i,
                needed: len,
                available: rest.len(),
            });
        }
        (*segment, rest) = rest.split_at(len);
    }
    if !rest.is_empty() {
        debug!("ignoring {} trailing bytes after the code stream", rest.len());
    }
    Ok(ans)
}

/// Decodes a container into named tensors.
pub fn decode(bytes: &[u8]) -> Result<Weights, FormatError> {
    let [manifest, dictionary, codes] = segments(bytes)?;
    debug!(
        "container segments: manifest {} B, dictionary {} B, codes {} B",
        manifest.len(),
        dictionary.len(),
        codes.len(),
    );

    let manifest: Vec<ShapeEntry> =
        serde_json::from_slice(manifest).map_err(FormatError::Manifest)?;

    if dictionary.len() % size_of::<f32>() != 0 {
        return Err(FormatError::Dictionary {
            bytes: dictionary.len(),
        });
    }
    let dictionary = dictionary
        .chunks_exact(size_of::<f32>())
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect::<Vec<_>>();

    let data = codes
        .iter()
        .enumerate()
        .map(|(offset, &code)| {
            dictionary
                .get(code as usize)
                .copied()
                .ok_or(FormatError::CodeOutOfRange {
                    offset,
                    code,
                    len: dictionary.len(),
                })
        })
        .collect::<Result<Arc<[f32]>, _>>()?;

    let mut weights = Weights::with_capacity(manifest.len(), dictionary.len());
    let mut offset = 0;
    for entry in manifest {
        let size = match entry.size() {
            Some(size) if size > 0 => size,
            _ => {
                return Err(FormatError::InvalidShape {
                    name: entry.name,
                    shape: entry.shape,
                })
            }
        };
        let available = data.len() - offset;
        if size > available {
            return Err(FormatError::Exhausted {
                name: entry.name,
                needed: size,
                available,
            });
        }
        let tensor = Tensor::new(&entry.shape, Storage::new(data.clone(), offset, size));
        offset += size;
        weights
            .insert(entry.name, tensor)
            .map_err(|(name, _)| FormatError::DuplicateName(name))?;
    }
    if offset < data.len() {
        warn!(
            "{} decoded values are not claimed by the manifest",
            data.len() - offset
        );
    }
    debug!(
        "decoded {} tensors, {} values, dictionary of {}",
        weights.len(),
        offset,
        dictionary.len(),
    );
    Ok(weights)
}

/// Quantizes tensors against `dictionary` and writes them as a container.
pub fn encode<'a, P>(
    entries: impl IntoIterator<Item = (&'a str, &'a Tensor<P>)>,
    dictionary: &Dictionary,
) -> Result<Vec<u8>, FormatError>
where
    P: Deref<Target = [f32]> + 'a,
{
    let mut manifest = Vec::new();
    let mut codes = Vec::new();
    for (name, tensor) in entries {
        manifest.push(ShapeEntry {
            name: name.into(),
            shape: tensor.shape().to_vec(),
        });
        codes.extend(tensor.as_slice().iter().map(|&x| dictionary.quantize(x)));
    }
    let manifest = serde_json::to_vec(&manifest).map_err(FormatError::Manifest)?;
    let dictionary = dictionary
        .values()
        .iter()
        .flat_map(|x| x.to_le_bytes())
        .collect::<Vec<_>>();

    let segments = [&*manifest, &*dictionary, &*codes];
    let mut ans = Vec::with_capacity(segments.iter().map(|s| PREFIX + s.len()).sum());
    for (i, segment) in segments.into_iter().enumerate() {
        let len = u32::try_from(segment.len()).map_err(|_| FormatError::Oversized {
            segment: i,
            len: segment.len(),
        })?;
        ans.extend_from_slice(&len.to_be_bytes());
        ans.extend_from_slice(segment);
    }
    Ok(ans)
}

#[cfg(test)]
fn container(manifest: &str, dictionary: &[f32], codes: &[u8]) -> Vec<u8> {
    let dictionary = dictionary
        .iter()
        .flat_map(|x| x.to_le_bytes())
        .collect::<Vec<_>>();
    let mut ans = Vec::new();
    for segment in [manifest.as_bytes(), &dictionary, codes] {
        ans.extend_from_slice(&(segment.len() as u32).to_be_bytes());
        ans.extend_from_slice(segment);
    }
    ans
}

#[cfg(test)]
const AB: &str = r#"[{"name":"a","shape":[2]},{"name":"b","shape":[2,2]}]"#;

#[test]
fn test_slicing_order() {
    let bytes = container(AB, &[0., 1.], &[0, 1, 1, 0, 1, 1]);
    let weights = decode(&bytes).unwrap();
    assert_eq!(weights.names().collect::<Vec<_>>(), ["a", "b"]);

    let a = weights.get("a").unwrap();
    assert_eq!(a.shape(), &[2]);
    assert_eq!(a.as_slice(), &[0., 1.]);

    let b = weights.get("b").unwrap();
    assert_eq!(b.shape(), &[2, 2]);
    assert_eq!(b.as_slice(), &[1., 0., 1., 1.]);
    assert_eq!(weights.dictionary_len(), 2);
}

#[test]
fn test_trailing_bytes() {
    let exact = container(AB, &[0., 1.], &[0, 1, 1, 0, 1, 1]);
    assert_eq!(decode(&exact).unwrap().len(), 2);

    let mut trailing = exact.clone();
    trailing.extend_from_slice(&[0, 0, 0, 0]);
    trailing.extend_from_slice(&[0xde, 0xad]);
    let weights = decode(&trailing).unwrap();
    assert_eq!(weights.get("b").unwrap().as_slice(), &[1., 0., 1., 1.]);
}

#[test]
fn test_truncated() {
    let bytes = container(AB, &[0., 1.], &[0, 1, 1, 0, 1, 1]);
    // declared code length exceeds what is left
    assert!(matches!(
        decode(&bytes[..bytes.len() - 1]),
        Err(FormatError::Truncated {
            segment: 2,
            needed: 6,
            available: 5
        })
    ));
    // cut inside the second length prefix
    let cut = PREFIX + AB.len() + 2;
    assert!(matches!(
        decode(&bytes[..cut]),
        Err(FormatError::Truncated { segment: 1, .. })
    ));
}

#[test]
fn test_missing_segment() {
    let bytes = container(AB, &[0., 1.], &[0, 1, 1, 0, 1, 1]);
    let two = PREFIX + AB.len() + PREFIX + 8;
    assert!(matches!(
        decode(&bytes[..two]),
        Err(FormatError::MissingSegment { found: 2 })
    ));
    assert!(matches!(
        decode(&[]),
        Err(FormatError::MissingSegment { found: 0 })
    ));
}

#[test]
fn test_bad_manifest() {
    let bytes = container("[{\"name\":\"a\"", &[0.], &[0]);
    assert!(matches!(decode(&bytes), Err(FormatError::Manifest(_))));

    let mut bytes = container("[]", &[0.], &[0]);
    bytes[PREFIX] = 0xff;
    assert!(matches!(decode(&bytes), Err(FormatError::Manifest(_))));
}

#[test]
fn test_code_out_of_range() {
    let bytes = container(AB, &[0., 1.], &[0, 1, 2, 0, 1, 1]);
    assert!(matches!(
        decode(&bytes),
        Err(FormatError::CodeOutOfRange {
            offset: 2,
            code: 2,
            len: 2
        })
    ));
}

#[test]
fn test_exhausted() {
    let bytes = container(AB, &[0., 1.], &[0, 1, 1, 0, 1]);
    assert!(matches!(
        decode(&bytes),
        Err(FormatError::Exhausted { ref name, needed: 4, available: 3 }) if name == "b"
    ));
}

#[test]
fn test_invalid_entries() {
    let bytes = container(r#"[{"name":"a","shape":[2,0]}]"#, &[0.], &[0]);
    assert!(matches!(decode(&bytes), Err(FormatError::InvalidShape { .. })));

    let dup = r#"[{"name":"a","shape":[1]},{"name":"a","shape":[1]}]"#;
    let bytes = container(dup, &[0.], &[0, 0]);
    assert!(matches!(decode(&bytes), Err(FormatError::DuplicateName(ref name)) if name == "a"));

    let mut bytes = container("[]", &[0.], &[]);
    // dictionary length of 3 bytes
    let at = PREFIX + 2;
    bytes[at..at + PREFIX].copy_from_slice(&3u32.to_be_bytes());
    bytes.remove(at + PREFIX);
    assert!(matches!(decode(&bytes), Err(FormatError::Dictionary { bytes: 3 })));
}

#[test]
fn test_round_trip() {
    let kernel = Tensor::new(
        &[3, 3, 2, 4],
        (0..72).map(|i| ((i * 37 % 23) as f32 - 11.) / 7.).collect::<Vec<_>>(),
    );
    let bias = Tensor::new(&[4], vec![0.25, -0.5, 1.5, 0.]);
    let values = kernel.as_slice().iter().chain(bias.as_slice()).copied();
    let dictionary = Dictionary::fit(values, 256);
    let step = dictionary.values()[1] - dictionary.values()[0];

    let bytes = encode([("k", &kernel), ("b", &bias)], &dictionary).unwrap();
    let weights = decode(&bytes).unwrap();
    assert_eq!(weights.dictionary_len(), dictionary.len());
    for (name, original) in [("k", &kernel), ("b", &bias)] {
        let decoded = weights.get(name).unwrap();
        assert_eq!(decoded.shape(), original.shape());
        for (x, y) in original.as_slice().iter().zip(decoded.as_slice()) {
            assert!((x - y).abs() <= step / 2. + 1e-6, "{x} vs {y}");
            assert!(dictionary.values().contains(y));
        }
    }
}
