use anyhow::{Context, Result};
use starshot::radial_profile::{circle_profile, samples_for_radius, CircleProfile};
use starshot::{Point, StarshotImage};
use std::path::Path;

pub fn dump_profile(
    path: &str,
    pixel_size: f64,
    radius: f64,
    center: Option<Point>,
    samples: Option<usize>,
    invert: bool,
    format: &str,
) -> Result<()> {
    let mut image = StarshotImage::from_file(Path::new(path), pixel_size)
        .with_context(|| format!("Failed to load image: {}", path))?;
    if invert {
        image = image.inverted();
    }

    let center = center.unwrap_or_else(|| image.geometric_center());
    let samples = samples.unwrap_or_else(|| samples_for_radius(radius));
    let profile = circle_profile(&image, center, radius, samples)
        .with_context(|| format!("Cannot sample radius {} px around {}", radius, center))?;

    match format.to_lowercase().as_str() {
        "json" => output_json(&profile)?,
        _ => output_csv(&profile),
    }
    Ok(())
}

fn output_csv(profile: &CircleProfile) {
    println!("index,angle_deg,x,y,intensity");
    for (i, (angle, value)) in profile.samples().enumerate() {
        let p = profile.point_at(i as f64);
        println!("{},{:.4},{:.3},{:.3},{:.3}", i, angle.to_degrees(), p.x, p.y, value);
    }
}

fn output_json(profile: &CircleProfile) -> Result<()> {
    let samples: Vec<serde_json::Value> = profile
        .samples()
        .map(|(angle, value)| {
            serde_json::json!({
                "angle_deg": angle.to_degrees(),
                "intensity": value,
            })
        })
        .collect();
    let output = serde_json::json!({
        "center": profile.center,
        "radius": profile.radius,
        "samples": samples,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
