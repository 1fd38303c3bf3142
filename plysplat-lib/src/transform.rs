use std::borrow::Cow;

use glam::{Mat3, Quat, Vec3};

use crate::common::{decode_dc, sigmoid};
use crate::error::SplatError;
use crate::structures::{ImportOptions, ParsedElement, PropertyData, SplatRecord};

const OPACITY: &str = "opacity";

/// Per-point splat columns pulled out of the point element, as `f32`.
pub struct SplatFields<'a> {
    position: [Cow<'a, [f32]>; 3],
    f_dc: [Cow<'a, [f32]>; 3],
    log_scale: [Cow<'a, [f32]>; 3],
    /// w, x, y, z
    rotation: [Cow<'a, [f32]>; 4],
    log_opacity: Option<Cow<'a, [f32]>>,
    default_log_opacity: f32,
    len: usize,
}

fn scalar_f32<'a>(
    element: &'a ParsedElement,
    property: &str,
) -> Result<Option<Cow<'a, [f32]>>, SplatError> {
    match element.get(property) {
        None => Ok(None),
        Some(PropertyData::Scalar(col)) => Ok(Some(match col.as_f32() {
            Some(values) => Cow::Borrowed(values),
            None => Cow::Owned(col.to_f32_vec()),
        })),
        Some(PropertyData::List { .. }) => Err(SplatError::NotScalar {
            element: element.name.clone(),
            property: property.to_string(),
        }),
    }
}

fn required<'a>(element: &'a ParsedElement, property: &str) -> Result<Cow<'a, [f32]>, SplatError> {
    scalar_f32(element, property)?.ok_or_else(|| SplatError::MissingProperty {
        element: element.name.clone(),
        property: property.to_string(),
    })
}

impl<'a> SplatFields<'a> {
    pub fn from_element(
        element: &'a ParsedElement,
        options: &ImportOptions,
    ) -> Result<Self, SplatError> {
        let fields = SplatFields {
            position: [
                required(element, "x")?,
                required(element, "y")?,
                required(element, "z")?,
            ],
            f_dc: [
                required(element, "f_dc_0")?,
                required(element, "f_dc_1")?,
                required(element, "f_dc_2")?,
            ],
            log_scale: [
                required(element, "scale_0")?,
                required(element, "scale_1")?,
                required(element, "scale_2")?,
            ],
            rotation: [
                required(element, "rot_0")?,
                required(element, "rot_1")?,
                required(element, "rot_2")?,
                required(element, "rot_3")?,
            ],
            log_opacity: scalar_f32(element, OPACITY)?,
            default_log_opacity: options.default_log_opacity,
            len: element.len(),
        };

        if fields.log_opacity.is_none() {
            tracing::debug!(
                element = %element.name,
                log_opacity = options.default_log_opacity,
                "no opacity property, using the default for every point"
            );
        }
        Ok(fields)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn log_opacity(&self, i: usize) -> f32 {
        self.log_opacity
            .as_ref()
            .map_or(self.default_log_opacity, |values| values[i])
    }

    /// Computes the render record of point `i`.
    pub fn record(&self, i: usize) -> Result<SplatRecord, SplatError> {
        let [x, y, z] = &self.position;
        let [r, g, b] = &self.f_dc;
        let [s0, s1, s2] = &self.log_scale;
        let [qw, qx, qy, qz] = &self.rotation;

        let vrk = covariance([qw[i], qx[i], qy[i], qz[i]], [s0[i], s1[i], s2[i]])
            .map_err(|reason| SplatError::DegenerateQuaternion {
                point: i,
                reason: reason.to_string(),
            })?;

        Ok(SplatRecord {
            center: [x[i], y[i], z[i]],
            color: [
                decode_dc(r[i]),
                decode_dc(g[i]),
                decode_dc(b[i]),
                sigmoid(self.log_opacity(i)),
            ],
            vrk,
        })
    }
}

/// Rotation-scale matrix `R(q) * diag(exp(log_scale))` for a quaternion in
/// w, x, y, z order. The quaternion does not need to be normalized.
pub fn rotation_scale(rotation: [f32; 4], log_scale: [f32; 3]) -> Result<Mat3, &'static str> {
    if rotation.iter().any(|c| !c.is_finite()) {
        return Err("quaternion has a non-finite component");
    }
    // Squares of f32 components neither underflow nor overflow in f64.
    let [w, x, y, z] = rotation.map(f64::from);
    let norm = (w * w + x * x + y * y + z * z).sqrt();
    if norm == 0.0 {
        return Err("quaternion has zero length");
    }

    let q = Quat::from_xyzw(
        (x / norm) as f32,
        (y / norm) as f32,
        (z / norm) as f32,
        (w / norm) as f32,
    );
    let scale = Vec3::new(log_scale[0].exp(), log_scale[1].exp(), log_scale[2].exp());
    Ok(Mat3::from_quat(q) * Mat3::from_diagonal(scale))
}

/// Upper triangle of `RS * RSᵀ`, row-major:
/// (0,0) (0,1) (0,2) (1,1) (1,2) (2,2).
pub fn covariance(rotation: [f32; 4], log_scale: [f32; 3]) -> Result<[f32; 6], &'static str> {
    let rs = rotation_scale(rotation, log_scale)?;
    let v = rs * rs.transpose();
    // glam matrices are column-major: entry (row, col) is `col_axis.row`.
    Ok([
        v.x_axis.x, v.y_axis.x, v.z_axis.x, v.y_axis.y, v.z_axis.y, v.z_axis.z,
    ])
}

cfg_if::cfg_if! {
if #[cfg(feature = "parallel")] {
    use rayon::prelude::*;

    fn compute_records(fields: &SplatFields<'_>) -> Result<Vec<SplatRecord>, SplatError> {
        (0..fields.len())
            .into_par_iter()
            .map(|i| fields.record(i))
            .collect()
    }
} else {
    fn compute_records(fields: &SplatFields<'_>) -> Result<Vec<SplatRecord>, SplatError> {
        (0..fields.len()).map(|i| fields.record(i)).collect()
    }
}
}

/// Transforms the point element with default options.
pub fn transform(element: &ParsedElement) -> Result<Vec<SplatRecord>, SplatError> {
    transform_with(element, &ImportOptions::default())
}

pub fn transform_with(
    element: &ParsedElement,
    options: &ImportOptions,
) -> Result<Vec<SplatRecord>, SplatError> {
    let fields = SplatFields::from_element(element, options)?;

    let records = compute_records(&fields)?;

    tracing::info!(element = %element.name, points = records.len(), "computed splat records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::structures::{ScalarColumn, ScalarType};
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::FRAC_1_SQRT_2;

    type M3 = [[f32; 3]; 3];

    fn matmul(a: &M3, b: &M3) -> M3 {
        let mut out = [[0.0; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                out[r][c] = (0..3).map(|k| a[r][k] * b[k][c]).sum();
            }
        }
        out
    }

    fn transpose(a: &M3) -> M3 {
        let mut out = [[0.0; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                out[r][c] = a[c][r];
            }
        }
        out
    }

    /// Rodrigues' formula for a unit axis and an angle.
    fn axis_angle(axis: [f32; 3], angle: f32) -> M3 {
        let [x, y, z] = axis;
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        [
            [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
            [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
            [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
        ]
    }

    fn reference_vrk(rot: &M3, log_scale: [f32; 3]) -> [f32; 6] {
        let diag = [
            [log_scale[0].exp(), 0.0, 0.0],
            [0.0, log_scale[1].exp(), 0.0],
            [0.0, 0.0, log_scale[2].exp()],
        ];
        let rs = matmul(rot, &diag);
        let v = matmul(&rs, &transpose(&rs));
        [v[0][0], v[0][1], v[0][2], v[1][1], v[1][2], v[2][2]]
    }

    fn assert_vrk_eq(actual: [f32; 6], expected: [f32; 6]) {
        for (a, e) in actual.iter().zip(expected) {
            assert_approx_eq!(*a, e, 1e-4);
        }
    }

    fn quat_for(axis: [f32; 3], angle: f32) -> [f32; 4] {
        let (s, c) = (angle / 2.0).sin_cos();
        [c, axis[0] * s, axis[1] * s, axis[2] * s]
    }

    #[test]
    fn test_identity_rotation_unit_scale() {
        let vrk = covariance([1.0, 0.0, 0.0, 0.0], [0.0; 3]).unwrap();
        assert_vrk_eq(vrk, [1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_covariance_matches_reference() {
        let log_scale = [0.3f32.ln(), 1.0, -2.0];
        let third = 1.0 / 3.0f32.sqrt();
        let cases: [([f32; 3], f32); 5] = [
            ([1.0, 0.0, 0.0], 0.0),
            ([1.0, 0.0, 0.0], std::f32::consts::FRAC_PI_2),
            ([0.0, 1.0, 0.0], std::f32::consts::FRAC_PI_2),
            ([0.0, 0.0, 1.0], std::f32::consts::FRAC_PI_2),
            ([third, third, third], 0.7),
        ];
        for (axis, angle) in cases {
            let vrk = covariance(quat_for(axis, angle), log_scale).unwrap();
            assert_vrk_eq(vrk, reference_vrk(&axis_angle(axis, angle), log_scale));
        }
    }

    #[test]
    fn test_quarter_turn_about_z_swaps_axes() {
        // exp(ln 2) = 2 along local x ends up along world y.
        let vrk = covariance([FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2], [2f32.ln(), 0.0, 0.0])
            .unwrap();
        assert_vrk_eq(vrk, [1.0, 0.0, 0.0, 4.0, 0.0, 1.0]);
    }

    #[test]
    fn test_quaternion_scale_invariance() {
        let q = [0.9, -0.2, 0.35, 0.1];
        let log_scale = [-1.0, 0.5, 0.25];
        let base = covariance(q, log_scale).unwrap();
        for k in [0.001f32, 3.0, -7.5] {
            let scaled = covariance([q[0] * k, q[1] * k, q[2] * k, q[3] * k], log_scale).unwrap();
            assert_vrk_eq(scaled, base);
        }
    }

    #[test]
    fn test_quaternion_scale_invariance_at_extreme_magnitudes() {
        let q = [0.9, -0.2, 0.35, 0.1];
        let log_scale = [-1.0, 0.5, 0.25];
        let base = covariance(q, log_scale).unwrap();
        for k in [1e-25f32, 1e20, -1e30] {
            let scaled = covariance(q.map(|c| c * k), log_scale)
                .unwrap_or_else(|e| panic!("k = {}: {}", k, e));
            assert_vrk_eq(scaled, base);
        }

        let tiny = covariance([f32::from_bits(1), 0.0, 0.0, 0.0], [0.0; 3]).unwrap();
        assert_vrk_eq(tiny, [1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_degenerate_quaternion() {
        assert_eq!(covariance([0.0; 4], [0.0; 3]), Err("quaternion has zero length"));
        assert_eq!(covariance([-0.0; 4], [0.0; 3]), Err("quaternion has zero length"));
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(
                covariance([1.0, 0.0, bad, 0.0], [0.0; 3]),
                Err("quaternion has a non-finite component")
            );
        }
    }

    fn splat_element(columns: &[(&str, Vec<f32>)]) -> ParsedElement {
        let count = columns.first().map_or(0, |(_, v)| v.len());
        let properties = columns
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    PropertyData::Scalar(ScalarColumn::Float32(values.clone())),
                )
            })
            .collect();
        ParsedElement::new("vertex".to_string(), count, properties)
    }

    fn unit_splats(n: usize) -> Vec<(&'static str, Vec<f32>)> {
        let names = [
            "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "scale_0", "scale_1", "scale_2",
            "rot_1", "rot_2", "rot_3",
        ];
        let mut cols: Vec<_> = names.iter().map(|&name| (name, vec![0.0; n])).collect();
        cols.push(("rot_0", vec![1.0; n]));
        cols
    }

    #[test]
    fn test_transform_without_opacity_defaults_every_point() {
        let element = splat_element(&unit_splats(3));
        let records = transform(&element).unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.color[..3], [0.5, 0.5, 0.5]);
            assert_approx_eq!(record.color[3], sigmoid(1.0), 1e-7);
        }

        let options = ImportOptions::default().with_default_log_opacity(0.0);
        let records = transform_with(&element, &options).unwrap();
        assert!(records.iter().all(|r| r.color[3] == 0.5));
    }

    #[test]
    fn test_transform_opacity_and_color() {
        let mut cols = unit_splats(3);
        cols.push(("opacity", vec![0.0, 50.0, -50.0]));
        cols[3].1 = vec![1.0 / crate::common::SH_C0, 0.0, -0.5 / crate::common::SH_C0];
        let records = transform(&splat_element(&cols)).unwrap();

        assert_approx_eq!(records[0].color[3], 0.5, 1e-7);
        assert_approx_eq!(records[1].color[3], 1.0, 1e-6);
        assert_approx_eq!(records[2].color[3], 0.0, 1e-6);
        assert_approx_eq!(records[0].color[0], 1.5, 1e-6);
        assert_approx_eq!(records[2].color[0], 0.0, 1e-6);
    }

    #[test]
    fn test_missing_rot_3_is_schema_error() {
        let cols: Vec<_> = unit_splats(2)
            .into_iter()
            .filter(|(name, _)| *name != "rot_3")
            .collect();
        let err = transform(&splat_element(&cols)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.to_string().contains("rot_3"), "{}", err);
    }

    #[test]
    fn test_degenerate_point_is_reported() {
        let mut cols = unit_splats(3);
        let rot_0 = cols.iter_mut().find(|(name, _)| *name == "rot_0").unwrap();
        rot_0.1[2] = 0.0;
        match transform(&splat_element(&cols)) {
            Err(SplatError::DegenerateQuaternion { point, .. }) => assert_eq!(point, 2),
            other => panic!("expected a numeric error, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_columns_are_accepted() {
        let mut element_cols = unit_splats(1);
        element_cols.retain(|(name, _)| *name != "x");
        let mut properties: Vec<(String, PropertyData)> = element_cols
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    PropertyData::Scalar(ScalarColumn::Float32(values.clone())),
                )
            })
            .collect();
        properties.push((
            "x".to_string(),
            PropertyData::Scalar(ScalarColumn::Int16(vec![-4])),
        ));
        let element = ParsedElement::new("vertex".to_string(), 1, properties);

        let records = transform(&element).unwrap();
        assert_eq!(records[0].center, [-4.0, 0.0, 0.0]);

        let properties = vec![(
            "x".to_string(),
            PropertyData::List {
                count_type: ScalarType::UInt8,
                item_type: ScalarType::Float32,
                rows: vec![ScalarColumn::Float32(vec![1.0])],
            },
        )];
        let element = ParsedElement::new("vertex".to_string(), 1, properties);
        let err = transform(&element).unwrap_err();
        assert!(matches!(err, SplatError::NotScalar { .. }));
    }
}
