//! Structural type matcher
//!
//! Resolves every member a shape requires against the member list of a
//! concrete type descriptor, producing a binding plan for the proxy
//! synthesizer. Matching is pure: no caches are touched and nothing is
//! synthesized here.
//!
//! Member-kind policy: a property never satisfies a method-shaped
//! member and a method never satisfies a property-shaped one. A field
//! may satisfy a property-shaped member; that is the only permitted
//! flattening.

use crate::error::DuckTypeError;
use calltarget_types::{
    enum_convertible, is_assignable, MemberDescriptor, ShapeId, ShapeMemberKind, ShapeRegistry,
    ShapeTypeRef, TypeId, TypeRegistry,
};
use rustc_hash::FxHashSet;

/// A value conversion baked into a proxy member at synthesis time
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Pass the value through unchanged
    Identity,
    /// Pass through; the declared type is a supertype of the concrete one
    Upcast,
    /// Re-tag an enum constant to the destination enum type
    EnumCast {
        /// Destination enum type
        to: TypeId,
    },
    /// Wrap an outgoing concrete value in a nested proxy for the shape
    WrapShape(ShapeId),
    /// Unwrap an incoming proxied argument to its raw instance
    UnwrapShape(ShapeId),
}

/// How one shape member binds to a concrete member
#[derive(Debug, Clone, PartialEq)]
pub enum BoundMember {
    /// Bound to a concrete method
    Method {
        /// Index of the concrete member in the descriptor
        index: usize,
        /// Conversion applied to each argument, in call order
        param_convs: Vec<Conversion>,
        /// Conversion applied to the result
        return_conv: Conversion,
    },
    /// Bound to a concrete property or field
    Property {
        /// Index of the concrete member in the descriptor
        index: usize,
        /// Read-path conversion, when the shape requests reads
        read: Option<Conversion>,
        /// Write-path conversion, when the shape requests writes
        write: Option<Conversion>,
    },
}

/// One resolved shape member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBinding {
    /// Index of the member in the shape's member list
    pub shape_member: usize,
    /// The concrete member it bound to
    pub bound: BoundMember,
}

/// A successful match: every shape member resolved
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBindingSet {
    /// The matched shape
    pub shape: ShapeId,
    /// The concrete type it was matched against
    pub target: TypeId,
    /// Bindings in shape member order
    pub bindings: Vec<MemberBinding>,
}

const SCORE_EXACT: u32 = 3;
const SCORE_COMPATIBLE: u32 = 2;
const SCORE_ENUM: u32 = 1;
const SCORE_ANY: u32 = 1;

/// Match a shape against a concrete type
///
/// Returns a binding for every required member, or the first failure.
/// When two concrete members satisfy one shape member with identical
/// specificity, the match fails with [`DuckTypeError::AmbiguousMatch`]
/// rather than picking one.
pub fn match_shape(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    shape_id: ShapeId,
    target: TypeId,
) -> Result<MemberBindingSet, DuckTypeError> {
    let mut in_progress = FxHashSet::default();
    match_shape_inner(types, shapes, shape_id, target, &mut in_progress)
}

fn match_shape_inner(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    shape_id: ShapeId,
    target: TypeId,
    in_progress: &mut FxHashSet<(ShapeId, TypeId)>,
) -> Result<MemberBindingSet, DuckTypeError> {
    let shape = shapes.get(shape_id)?;
    let desc = types.get(target)?;
    in_progress.insert((shape_id, target));

    let mut bindings = Vec::with_capacity(shape.members().len());
    for (shape_index, required) in shape.members().iter().enumerate() {
        // Every named member is scored; the single best-scoring candidate
        // wins, a tie is an error.
        let mut viable: Vec<(u32, BoundMember, usize)> = Vec::new();
        let mut direction_failure = false;

        for (index, member) in desc.members_named(&required.name) {
            match (&required.kind, member) {
                (ShapeMemberKind::Method { params, return_type }, MemberDescriptor::Method(m)) => {
                    if m.params.len() != params.len() {
                        continue;
                    }
                    let mut score = 0;
                    let mut param_convs = Vec::with_capacity(params.len());
                    let mut compatible = true;
                    for (declared, &concrete) in params.iter().zip(&m.params) {
                        match param_conversion(types, shapes, declared, concrete, in_progress) {
                            Some((s, conv)) => {
                                score += s;
                                param_convs.push(conv);
                            }
                            None => {
                                compatible = false;
                                break;
                            }
                        }
                    }
                    if !compatible {
                        continue;
                    }
                    let (return_score, return_conv) = match result_conversion(
                        types,
                        shapes,
                        return_type,
                        m.return_type,
                        in_progress,
                    ) {
                        Some(found) => found,
                        None => continue,
                    };
                    viable.push((
                        score + return_score,
                        BoundMember::Method {
                            index,
                            param_convs,
                            return_conv,
                        },
                        index,
                    ));
                }
                (ShapeMemberKind::Property { ty, access }, MemberDescriptor::Property(p)) => {
                    if (access.reads() && p.getter.is_none())
                        || (access.writes() && p.setter.is_none())
                    {
                        direction_failure = true;
                        continue;
                    }
                    if let Some(candidate) =
                        property_candidate(types, shapes, ty, *access, p.ty, index, in_progress)
                    {
                        viable.push(candidate);
                    }
                }
                (ShapeMemberKind::Property { ty, access }, MemberDescriptor::Field(f)) => {
                    if access.writes() && f.set.is_none() {
                        direction_failure = true;
                        continue;
                    }
                    if let Some(candidate) =
                        property_candidate(types, shapes, ty, *access, f.ty, index, in_progress)
                    {
                        viable.push(candidate);
                    }
                }
                // No member-kind flattening beyond field-as-property.
                _ => continue,
            }
        }

        let binding = select_candidate(
            types,
            &desc,
            viable,
            direction_failure,
            shape.name(),
            &required.name,
        )?;
        bindings.push(MemberBinding {
            shape_member: shape_index,
            bound: binding,
        });
    }

    in_progress.remove(&(shape_id, target));
    Ok(MemberBindingSet {
        shape: shape_id,
        target,
        bindings,
    })
}

/// Pick the single best candidate or fail with the appropriate error
fn select_candidate(
    types: &TypeRegistry,
    desc: &calltarget_types::TypeDescriptor,
    viable: Vec<(u32, BoundMember, usize)>,
    direction_failure: bool,
    shape_name: &str,
    member_name: &str,
) -> Result<BoundMember, DuckTypeError> {
    let mut best: Option<(u32, BoundMember, usize)> = None;
    let mut tied_with: Option<usize> = None;
    for (score, binding, index) in viable {
        match &best {
            Some((best_score, _, _)) if score < *best_score => {}
            Some((best_score, _, _)) if score == *best_score => tied_with = Some(index),
            _ => {
                best = Some((score, binding, index));
                tied_with = None;
            }
        }
    }

    match (best, tied_with) {
        (Some((_, _, first_index)), Some(second_index)) => Err(DuckTypeError::AmbiguousMatch {
            shape: shape_name.to_string(),
            member: member_name.to_string(),
            target: desc.name().to_string(),
            first: render_member(types, desc.member(first_index)),
            second: render_member(types, desc.member(second_index)),
        }),
        (Some((_, binding, _)), None) => Ok(binding),
        (None, _) if direction_failure => Err(DuckTypeError::DirectionMismatch {
            shape: shape_name.to_string(),
            member: member_name.to_string(),
            target: desc.name().to_string(),
            direction: "requested",
        }),
        (None, _) => Err(DuckTypeError::MemberNotFound {
            shape: shape_name.to_string(),
            member: member_name.to_string(),
            target: desc.name().to_string(),
        }),
    }
}

fn property_candidate(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    declared: &ShapeTypeRef,
    access: calltarget_types::Access,
    concrete: TypeId,
    index: usize,
    in_progress: &mut FxHashSet<(ShapeId, TypeId)>,
) -> Option<(u32, BoundMember, usize)> {
    let mut score = 0;
    let mut read = None;
    let mut write = None;
    if access.reads() {
        let (s, conv) = result_conversion(types, shapes, declared, concrete, in_progress)?;
        score += s;
        read = Some(conv);
    }
    if access.writes() {
        let (s, conv) = param_conversion(types, shapes, declared, concrete, in_progress)?;
        score += s;
        write = Some(conv);
    }
    Some((
        score,
        BoundMember::Property { index, read, write },
        index,
    ))
}

/// Conversion for a value flowing from the shape signature into the
/// concrete member (arguments, property writes)
fn param_conversion(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    declared: &ShapeTypeRef,
    concrete: TypeId,
    in_progress: &mut FxHashSet<(ShapeId, TypeId)>,
) -> Option<(u32, Conversion)> {
    match declared {
        ShapeTypeRef::Concrete(t) => {
            if *t == concrete {
                Some((SCORE_EXACT, Conversion::Identity))
            } else if is_assignable(types, *t, concrete) {
                Some((SCORE_COMPATIBLE, Conversion::Upcast))
            } else if enum_convertible(types, *t, concrete) {
                Some((SCORE_ENUM, Conversion::EnumCast { to: concrete }))
            } else {
                None
            }
        }
        ShapeTypeRef::Shape(s) => {
            if shape_matches(types, shapes, *s, concrete, in_progress) {
                Some((SCORE_COMPATIBLE, Conversion::UnwrapShape(*s)))
            } else {
                None
            }
        }
        ShapeTypeRef::Any => Some((SCORE_ANY, Conversion::Identity)),
    }
}

/// Conversion for a value flowing from the concrete member back to the
/// shape signature (results, property reads)
fn result_conversion(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    declared: &ShapeTypeRef,
    concrete: TypeId,
    in_progress: &mut FxHashSet<(ShapeId, TypeId)>,
) -> Option<(u32, Conversion)> {
    match declared {
        ShapeTypeRef::Concrete(t) => {
            if *t == concrete {
                Some((SCORE_EXACT, Conversion::Identity))
            } else if *t == TypeId::VOID {
                // The shape discards the result.
                Some((SCORE_COMPATIBLE, Conversion::Identity))
            } else if is_assignable(types, concrete, *t) {
                Some((SCORE_COMPATIBLE, Conversion::Upcast))
            } else if enum_convertible(types, concrete, *t) {
                Some((SCORE_ENUM, Conversion::EnumCast { to: *t }))
            } else {
                None
            }
        }
        ShapeTypeRef::Shape(s) => {
            if shape_matches(types, shapes, *s, concrete, in_progress) {
                Some((SCORE_COMPATIBLE, Conversion::WrapShape(*s)))
            } else {
                None
            }
        }
        ShapeTypeRef::Any => Some((SCORE_ANY, Conversion::Identity)),
    }
}

/// Recursive satisfiability check for shape-typed positions
///
/// Pairs already being matched higher up the stack are assumed to hold;
/// the assumption is discharged when the outer match completes.
fn shape_matches(
    types: &TypeRegistry,
    shapes: &ShapeRegistry,
    shape_id: ShapeId,
    target: TypeId,
    in_progress: &mut FxHashSet<(ShapeId, TypeId)>,
) -> bool {
    if in_progress.contains(&(shape_id, target)) {
        return true;
    }
    match_shape_inner(types, shapes, shape_id, target, in_progress).is_ok()
}

fn render_member(types: &TypeRegistry, member: Option<&MemberDescriptor>) -> String {
    match member {
        Some(MemberDescriptor::Method(m)) => {
            let params: Vec<String> = m.params.iter().map(|&p| types.name_of(p)).collect();
            format!("{}({})", m.name, params.join(", "))
        }
        Some(MemberDescriptor::Property(p)) => format!("property '{}'", p.name),
        Some(MemberDescriptor::Field(f)) => format!("field '{}'", f.name),
        None => String::from("<unknown member>"),
    }
}
