//! BSDF evaluation and sampling
//!
//! Lambertian diffuse with cosine-weighted sampling, a GGX/Smith/Schlick
//! metallic-roughness specular model, and the Henyey-Greenstein phase
//! function for participating media.

use cgmath::{InnerSpace, Vector3, VectorSpace};
use rand::rngs::SmallRng;
use rand::Rng;
use std::f32::consts::PI;

const MIN_ROUGHNESS: f32 = 0.03;

/// Builds an orthonormal basis around `n` (Duff et al. branchless variant).
pub fn onb(n: Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let sign = 1.0f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let t = Vector3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bt = Vector3::new(b, sign + n.y * n.y * a, -n.y);
    (t, bt)
}

/// Cosine-weighted hemisphere direction around `n`, pdf = cos(theta) / pi.
pub fn sample_cosine(n: Vector3<f32>, rng: &mut SmallRng) -> Vector3<f32> {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    let r = u1.sqrt();
    let phi = 2.0 * PI * u2;
    let local = Vector3::new(r * phi.cos(), r * phi.sin(), (1.0 - u1).max(0.0).sqrt());
    let (t, bt) = onb(n);
    (t * local.x + bt * local.y + n * local.z).normalize()
}

pub fn fresnel_schlick(cos_theta: f32, f0: Vector3<f32>) -> Vector3<f32> {
    let m = (1.0 - cos_theta).clamp(0.0, 1.0);
    let m5 = m * m * m * m * m;
    f0 + (Vector3::new(1.0, 1.0, 1.0) - f0) * m5
}

/// GGX normal distribution (Trowbridge-Reitz).
pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * d * d).max(1e-8)
}

/// Smith height-correlated visibility term, V = G / (4 NdotV NdotL).
pub fn visibility_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let lv = n_dot_l * (n_dot_v * n_dot_v * (1.0 - a2) + a2).sqrt();
    let ll = n_dot_v * (n_dot_l * n_dot_l * (1.0 - a2) + a2).sqrt();
    0.5 / (lv + ll).max(1e-8)
}

/// GGX half-vector sample around `n`, distributed by D * NdotH.
pub fn sample_ggx_half(n: Vector3<f32>, roughness: f32, rng: &mut SmallRng) -> Vector3<f32> {
    let a = roughness * roughness;
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    let cos_theta = ((1.0 - u1) / (1.0 + (a * a - 1.0) * u1)).max(0.0).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    let local = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
    let (t, bt) = onb(n);
    (t * local.x + bt * local.y + n * local.z).normalize()
}

/// Evaluates the metallic-roughness BRDF for a light direction `l`.
pub fn pbr_eval(
    albedo: Vector3<f32>,
    metallic: f32,
    roughness: f32,
    n: Vector3<f32>,
    v: Vector3<f32>,
    l: Vector3<f32>,
) -> Vector3<f32> {
    let n_dot_v = n.dot(v).max(1e-4);
    let n_dot_l = n.dot(l);
    if n_dot_l <= 0.0 {
        return Vector3::new(0.0, 0.0, 0.0);
    }
    let roughness = roughness.max(MIN_ROUGHNESS);
    let h = (v + l).normalize();
    let f0 = Vector3::new(0.04, 0.04, 0.04).lerp(albedo, metallic);
    let f = fresnel_schlick(h.dot(v).max(0.0), f0);
    let d = distribution_ggx(n.dot(h).max(0.0), roughness);
    let vis = visibility_smith(n_dot_v, n_dot_l, roughness);
    let specular = f * d * vis;
    let k_d = (Vector3::new(1.0, 1.0, 1.0) - f) * (1.0 - metallic);
    Vector3::new(
        k_d.x * albedo.x / PI + specular.x,
        k_d.y * albedo.y / PI + specular.y,
        k_d.z * albedo.z / PI + specular.z,
    )
}

/// Result of sampling a scattering direction: the new direction and the
/// throughput weight `f * cos / pdf` already folded together.
pub struct BsdfSample {
    pub direction: Vector3<f32>,
    pub weight: Vector3<f32>,
}

/// Samples the metallic-roughness BRDF with a 50/50 lobe split between the
/// cosine-weighted diffuse lobe and the GGX specular lobe.
pub fn pbr_sample(
    albedo: Vector3<f32>,
    metallic: f32,
    roughness: f32,
    n: Vector3<f32>,
    v: Vector3<f32>,
    rng: &mut SmallRng,
) -> Option<BsdfSample> {
    let roughness = roughness.max(MIN_ROUGHNESS);
    let spec_prob = 0.5;
    let l = if rng.random::<f32>() < spec_prob {
        let h = sample_ggx_half(n, roughness, rng);
        let l = (-v + h * (2.0 * v.dot(h))).normalize();
        if n.dot(l) <= 0.0 {
            return None;
        }
        l
    } else {
        sample_cosine(n, rng)
    };
    let n_dot_l = n.dot(l).max(0.0);
    if n_dot_l <= 0.0 {
        return None;
    }
    // Mixture pdf over both lobes.
    let h = (v + l).normalize();
    let pdf_diffuse = n_dot_l / PI;
    let pdf_spec = distribution_ggx(n.dot(h).max(0.0), roughness) * n.dot(h).max(0.0)
        / (4.0 * v.dot(h).abs()).max(1e-8);
    let pdf = spec_prob * pdf_spec + (1.0 - spec_prob) * pdf_diffuse;
    if pdf <= 1e-8 {
        return None;
    }
    let f = pbr_eval(albedo, metallic, roughness, n, v, l);
    Some(BsdfSample {
        direction: l,
        weight: f * (n_dot_l / pdf),
    })
}

/// Henyey-Greenstein phase function value for `cos_theta` between the
/// incoming and outgoing directions.
pub fn hg_phase(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    let denom = (1.0 + g2 - 2.0 * g * cos_theta).max(1e-6);
    (1.0 - g2) / (4.0 * PI * denom * denom.sqrt())
}

/// Samples a direction from the Henyey-Greenstein phase function relative to
/// the incoming direction `w`. The pdf equals the phase value, so the
/// throughput weight of the sample is exactly 1.
pub fn hg_sample(w: Vector3<f32>, g: f32, rng: &mut SmallRng) -> Vector3<f32> {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    let cos_theta = if g.abs() < 1e-3 {
        1.0 - 2.0 * u1
    } else {
        let sq = (1.0 - g * g) / (1.0 - g + 2.0 * g * u1);
        (1.0 + g * g - sq * sq) / (2.0 * g)
    };
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * u2;
    let (t, bt) = onb(w);
    (t * (sin_theta * phi.cos()) + bt * (sin_theta * phi.sin()) + w * cos_theta).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn cosine_samples_stay_in_hemisphere() {
        let mut rng = SmallRng::seed_from_u64(1);
        let n = Vector3::new(0.0, 1.0, 0.0);
        for _ in 0..200 {
            let d = sample_cosine(n, &mut rng);
            assert!(n.dot(d) >= 0.0);
            assert!((d.magnitude() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn fresnel_grazes_to_white() {
        let f = fresnel_schlick(0.0, Vector3::new(0.04, 0.04, 0.04));
        assert!(f.x > 0.99);
    }

    #[test]
    fn hg_isotropic_limit_matches_uniform_sphere() {
        // g = 0 must reduce to 1 / (4 pi).
        let p = hg_phase(0.3, 0.0);
        assert!((p - 1.0 / (4.0 * PI)).abs() < 1e-6);
    }

    #[test]
    fn pbr_eval_zero_below_horizon() {
        let n = Vector3::new(0.0, 1.0, 0.0);
        let v = Vector3::new(0.0, 1.0, 0.0);
        let l = Vector3::new(0.0, -1.0, 0.0);
        let f = pbr_eval(Vector3::new(0.5, 0.5, 0.5), 0.0, 0.5, n, v, l);
        assert_eq!(f, Vector3::new(0.0, 0.0, 0.0));
    }
}
