use crate::cli::AnalysisOptions;
use anyhow::{Context, Result};
use starshot::{MechPointOrigin, MechPointWarning, Point, Starshot, StarshotImage, StarshotResults};
use std::path::Path;
use std::sync::Arc;

/// Analyze one film and print the report. Returns whether it passed.
pub fn analyze_film(
    path: &str,
    options: &AnalysisOptions,
    mech_point: Option<Point>,
    format: &str,
) -> Result<bool> {
    let config = options.to_config()?;
    let image = StarshotImage::from_file(Path::new(path), options.pixel_size)
        .with_context(|| format!("Failed to load image: {}", path))?;

    let mut starshot = Starshot::with_image(config, Arc::new(image))?;
    let warning = match mech_point {
        Some(point) => starshot.set_mech_point(point, true)?,
        None => None,
    };
    starshot
        .analyze()
        .with_context(|| format!("Star-shot analysis failed for {}", path))?;
    let results = starshot
        .results()
        .context("Analysis finished without results")?;

    match format.to_lowercase().as_str() {
        "json" => output_json(path, &results, warning.as_ref())?,
        _ => output_table(path, &results, warning.as_ref()),
    }

    Ok(results.passed)
}

fn output_table(path: &str, results: &StarshotResults, warning: Option<&MechPointWarning>) {
    println!("Star-shot analysis: {}\n", path);
    println!("{:<28} {}", "Result", if results.passed { "PASS" } else { "FAIL" });
    println!(
        "{:<28} {:.3} mm ({:.2} px)",
        "Wobble radius", results.wobble_radius_mm, results.wobble_radius_px
    );
    println!("{:<28} {:.3} mm", "Wobble diameter", results.wobble_diameter_mm);
    println!("{:<28} {:.3} mm", "Tolerance (radius)", results.tolerance_mm);
    println!(
        "{:<28} x={:.1} y={:.1} px",
        "Wobble center", results.wobble_center.x, results.wobble_center.y
    );
    println!(
        "{:<28} x={:.1} y={:.1} px ({})",
        "Mechanical point",
        results.mechanical_point.x,
        results.mechanical_point.y,
        match results.mechanical_point_origin {
            Some(MechPointOrigin::Auto) => "auto",
            Some(MechPointOrigin::User) => "user",
            None => "unset",
        }
    );
    println!("{:<28} {:.3} mm", "Center offset", results.center_offset_mm);
    println!("{:<28} {}", "Spokes", results.spoke_count);
    println!("{:<28} {:.3} px", "Worst line residual", results.max_line_residual_px);
    println!(
        "{:<28} {}{}",
        "Inverted",
        if results.inverted { "yes" } else { "no" },
        if results.inversion_overridden { " (forced)" } else { "" }
    );
    let stats = &results.image_statistics;
    println!(
        "{:<28} {}x{}, median {:.1}, range {:.1}..{:.1}",
        "Image", stats.width, stats.height, stats.median, stats.min, stats.max
    );

    println!("\n{:<8} {:<12}", "Spoke", "Angle (deg)");
    println!("{:-<20}", "");
    for (i, angle) in results.spoke_angles_deg.iter().enumerate() {
        println!("{:<8} {:<12.2}", i, angle);
    }

    if let Some(w) = warning {
        println!("\nWarning: {}", w);
    }
}

fn output_json(path: &str, results: &StarshotResults, warning: Option<&MechPointWarning>) -> Result<()> {
    let output = serde_json::json!({
        "file": path,
        "results": results,
        "mech_point_warning": warning,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
