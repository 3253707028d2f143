//! Shared attribute validation: declared types, modifier constraints,
//! required/default handling, and uniqueness.

use crate::{MutationError, MutationResult};
use mew_core::{Attributes, NodeId, TypeId, Value};
use mew_graph::GraphRead;
use mew_registry::{AttrDef, Registry};

/// Check a value against an attribute's declared type.
pub fn check_attr_type(owner: &str, attr: &AttrDef, value: &Value) -> MutationResult<()> {
    if value.is_null() {
        return Ok(());
    }
    if !value.matches_type_name(&attr.type_name) {
        return Err(MutationError::InvalidAttrType {
            attr: format!("{}.{}", owner, attr.name),
            expected: attr.type_name.clone(),
            actual: value.type_name().to_string(),
        });
    }
    Ok(())
}

/// Check every declared modifier that holds where the value is non-null:
/// range bounds, allowed values, match pattern, length, format.
pub fn check_modifiers(attr: &AttrDef, value: &Value) -> MutationResult<()> {
    if value.is_null() {
        return Ok(());
    }

    let fail = |message: String| {
        Err(MutationError::ModifierViolation {
            attr: attr.name.clone(),
            message,
        })
    };

    if let Some(min) = &attr.min {
        if value.cmp_sortable(min) == std::cmp::Ordering::Less {
            return fail(format!("value {} is below the minimum {}", value, min));
        }
    }
    if let Some(max) = &attr.max {
        if value.cmp_sortable(max) == std::cmp::Ordering::Greater {
            return fail(format!("value {} is above the maximum {}", value, max));
        }
    }

    if let Some(allowed) = &attr.allowed_values {
        if !allowed.iter().any(|v| v == value) {
            return fail(format!("value {} is not in the allowed set", value));
        }
    }

    if let Value::String(text) = value {
        if let Some(min) = attr.length_min {
            if (text.chars().count() as i64) < min {
                return fail(format!("length below the minimum of {}", min));
            }
        }
        if let Some(max) = attr.length_max {
            if (text.chars().count() as i64) > max {
                return fail(format!("length above the maximum of {}", max));
            }
        }
        if let Some(pattern) = &attr.match_pattern {
            if !pattern.is_match(text) {
                return fail(format!("value does not match /{}/", pattern.source));
            }
        }
        if let Some(format) = &attr.format {
            if !check_format(format, text) {
                return fail(format!("value is not a valid {}", format));
            }
        }
    }

    Ok(())
}

/// Built-in format validators.
fn check_format(format: &str, text: &str) -> bool {
    match format {
        "email" => {
            let Some((local, domain)) = text.split_once('@') else {
                return false;
            };
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        "url" => text.starts_with("http://") || text.starts_with("https://"),
        "uuid" => {
            let parts: Vec<&str> = text.split('-').collect();
            parts.len() == 5
                && [8, 4, 4, 4, 12]
                    .iter()
                    .zip(&parts)
                    .all(|(len, part)| part.len() == *len && part.chars().all(|c| c.is_ascii_hexdigit()))
        }
        "slug" => {
            !text.is_empty()
                && text
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        }
        _ => true,
    }
}

/// Fill in declared defaults for attributes not provided.
pub fn apply_defaults(registry: &Registry, type_id: TypeId, attrs: &mut Attributes) {
    for attr in registry.all_type_attrs(type_id) {
        if let Some(default) = &attr.default {
            if !attrs.contains_key(&attr.name) {
                attrs.insert(attr.name.clone(), default.clone());
            }
        }
    }
}

/// Every required attribute must be present and non-null.
pub fn check_required(
    registry: &Registry,
    type_name: &str,
    type_id: TypeId,
    attrs: &Attributes,
) -> MutationResult<()> {
    for attr in registry.all_type_attrs(type_id) {
        if attr.required {
            let present = attrs.get(&attr.name).map(|v| !v.is_null()).unwrap_or(false);
            if !present {
                return Err(MutationError::MissingRequired {
                    type_name: type_name.to_string(),
                    attr: attr.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Unique attributes must not collide across the extent of the declaring
/// type (including all its subtypes). `exclude` skips the entity itself on
/// SET re-validation.
pub fn check_unique_attrs(
    view: &dyn GraphRead,
    registry: &Registry,
    type_name: &str,
    type_id: TypeId,
    attrs: &Attributes,
    exclude: Option<NodeId>,
) -> MutationResult<()> {
    for attr in registry.all_type_attrs(type_id) {
        if !attr.unique {
            continue;
        }
        let Some(value) = attrs.get(&attr.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        let declaring = declaring_type(registry, type_id, &attr.name).unwrap_or(type_id);
        for scan_type in registry.concrete_types_of(declaring) {
            for other in view.nodes_by_attr(scan_type, &attr.name, value) {
                if Some(other) != exclude {
                    return Err(MutationError::UniqueCollision {
                        type_name: type_name.to_string(),
                        attr: attr.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Walk up the hierarchy to the type that declares an attribute; the
/// uniqueness extent is that type plus all of its subtypes.
fn declaring_type(registry: &Registry, type_id: TypeId, attr: &str) -> Option<TypeId> {
    let def = registry.get_type(type_id)?;
    for &parent in &def.parent_ids {
        if let Some(found) = declaring_type(registry, parent, attr) {
            return Some(found);
        }
    }
    if def.attributes.contains_key(attr) {
        Some(type_id)
    } else {
        None
    }
}
