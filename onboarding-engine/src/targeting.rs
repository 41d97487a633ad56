//! Template selection for a hire.

use onboarding_sdk::{HireProfile, WorkflowTemplate};

/// Empty audience lists match everyone
pub fn audience_allows(audience: &[String], value: &str) -> bool {
    audience.is_empty() || audience.iter().any(|a| a.eq_ignore_ascii_case(value))
}

/// Whether a template's role and department targets admit the hire
pub fn matches_hire(template: &WorkflowTemplate, hire: &HireProfile) -> bool {
    audience_allows(&template.role_targets, &hire.role)
        && audience_allows(&template.department_targets, &hire.department)
}

/// Number of non-empty targeting constraints (0..=2)
pub fn specificity(template: &WorkflowTemplate) -> u8 {
    u8::from(!template.role_targets.is_empty()) + u8::from(!template.department_targets.is_empty())
}

/// Pick the most specific active template that matches the hire.
///
/// Ties go to the template that comes first in catalog order. `None` means
/// no workflow applies, which callers surface as "no workflow applied".
pub fn select_template<'a>(
    hire: &HireProfile,
    catalog: &'a [WorkflowTemplate],
) -> Option<&'a WorkflowTemplate> {
    best_match(hire, catalog.iter().filter(|t| t.is_active))
}

/// Like [`select_template`] but only considers auto-trigger templates
pub fn select_auto_trigger_template<'a>(
    hire: &HireProfile,
    catalog: &'a [WorkflowTemplate],
) -> Option<&'a WorkflowTemplate> {
    best_match(
        hire,
        catalog.iter().filter(|t| t.is_active && t.auto_trigger),
    )
}

fn best_match<'a>(
    hire: &HireProfile,
    candidates: impl Iterator<Item = &'a WorkflowTemplate>,
) -> Option<&'a WorkflowTemplate> {
    let mut best: Option<&WorkflowTemplate> = None;
    for template in candidates.filter(|t| matches_hire(t, hire)) {
        // Strictly greater keeps the earliest template on ties
        if best.map_or(true, |b| specificity(template) > specificity(b)) {
            best = Some(template);
        }
    }
    best
}
