use tera::Tera;

use crate::error::AppError;

/// Name of the HTML fallback template
pub const HEALTH_TEMPLATE: &str = "health.html";

/// Initialize the Tera template engine.
///
/// Templates are compiled into the binary so the endpoint keeps working when
/// the process runs from an unrelated working directory.
pub fn init_templates() -> Result<Tera, AppError> {
    let mut tera = Tera::default();
    tera.add_raw_template(HEALTH_TEMPLATE, include_str!("../templates/health.html"))?;
    Ok(tera)
}
