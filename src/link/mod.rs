//! The link model: the authoritative registry of pairwise relationships
//! between datasets in a collection.
//!
//! A [`LinkSet`] is an immutable value. Recomputing links builds a complete
//! new set which the session swaps in atomically; a failed recompute leaves
//! the previous set untouched. All read access goes through the current set
//! and must re-fetch it across event boundaries rather than caching it.

mod fit;

pub use fit::{fit_affine, AffineMap, FitKind};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collection::DataCollection;
use crate::error::FramelinkError;

/// The linking scheme for a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Pixels,
    Wcs,
}

impl LinkType {
    pub fn parse(value: &str) -> Result<Self, FramelinkError> {
        match value {
            "pixels" => Ok(Self::Pixels),
            "wcs" => Ok(Self::Wcs),
            other => Err(FramelinkError::InvalidParameter {
                parameter: "link_type",
                value: other.to_string(),
                allowed: "'pixels' or 'wcs'",
            }),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixels => write!(f, "pixels"),
            Self::Wcs => write!(f, "wcs"),
        }
    }
}

/// What to do with datasets that cannot be WCS-linked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackScheme {
    /// Silently pixel-link the offending dataset only.
    Pixels,
}

/// Parse an optional fallback scheme from its CLI/config spelling.
pub fn parse_fallback(value: &str) -> Result<Option<FallbackScheme>, FramelinkError> {
    match value {
        "none" => Ok(None),
        "pixels" => Ok(Some(FallbackScheme::Pixels)),
        other => Err(FramelinkError::InvalidParameter {
            parameter: "wcs_fallback_scheme",
            value: other.to_string(),
            allowed: "'none' or 'pixels'",
        }),
    }
}

/// Parameters of a link recompute, mirroring the public `link_data` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkOptions {
    pub link_type: LinkType,
    pub wcs_fallback_scheme: Option<FallbackScheme>,
    pub wcs_use_affine: bool,
    pub error_on_fail: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            link_type: LinkType::Pixels,
            wcs_fallback_scheme: None,
            wcs_use_affine: true,
            error_on_fail: false,
        }
    }
}

/// How a non-reference dataset relates to the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinkKind {
    /// Pixel grids are identified one-to-one.
    PixelIdentity,
    /// Fitted affine approximation of the WCS relation.
    Affine,
    /// Translation-only special case of the affine approximation.
    Offset,
    /// Full composition through both frames' world transforms.
    GeneralWcs,
}

impl LinkKind {
    /// The user-facing link type this kind answers for.
    pub fn status(&self) -> LinkStatus {
        match self {
            Self::PixelIdentity => LinkStatus::Pixels,
            _ => LinkStatus::Wcs,
        }
    }
}

/// Answer to a "how are A and B related" query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    SelfLink,
    Pixels,
    Wcs,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfLink => write!(f, "self"),
            Self::Pixels => write!(f, "pixels"),
            Self::Wcs => write!(f, "wcs"),
        }
    }
}

/// A stored relation between one dataset and the reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// Label of the non-reference dataset.
    pub label: String,
    pub kind: LinkKind,
    /// Forward map (dataset pixels to reference pixels) for affine kinds.
    pub map: Option<AffineMap>,
}

/// A pixel position carried through a link composition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mapped {
    pub x: f64,
    pub y: f64,
    /// True when the composition passed outside a declared validity region,
    /// or through a degenerate projection.
    pub extrapolated: bool,
}

impl Mapped {
    fn exact(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            extrapolated: false,
        }
    }

    fn undefined() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            extrapolated: true,
        }
    }
}

/// The complete set of links for a collection under one scheme.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkSet {
    reference: Option<String>,
    link_type: LinkType,
    links: Vec<Link>,
}

impl LinkSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn link_for(&self, label: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.label == label)
    }

    /// Build the link set for `collection` rooted at `reference`.
    ///
    /// In WCS mode, datasets without a valid celestial frame either fall
    /// back to a pixel-identity link (when the fallback scheme says so) or
    /// fail the whole computation; nothing is partially applied.
    pub fn compute(
        collection: &DataCollection,
        reference: &str,
        options: &LinkOptions,
    ) -> Result<Self, FramelinkError> {
        let ref_data = collection
            .get(reference)
            .ok_or_else(|| FramelinkError::label_not_linked(reference))?;

        let mut links = Vec::new();
        for dataset in collection.iter() {
            if dataset.label == reference {
                continue;
            }
            match options.link_type {
                LinkType::Pixels => {
                    // Orientation layers own no real pixel grid and stay
                    // outside the pixel spanning structure.
                    if dataset.origin.is_orientation() {
                        continue;
                    }
                    links.push(Link {
                        label: dataset.label.clone(),
                        kind: LinkKind::PixelIdentity,
                        map: None,
                    });
                }
                LinkType::Wcs => {
                    let ref_wcs = ref_data
                        .adapter
                        .celestial_component()
                        .ok_or_else(|| FramelinkError::MissingCoordinateFrame {
                            label: reference.to_string(),
                        })?;
                    match dataset.adapter.celestial_component() {
                        Some(wcs) => {
                            let fitted = if options.wcs_use_affine {
                                fit_affine(wcs, dataset.shape, ref_wcs)
                            } else {
                                None
                            };
                            let (kind, map) = match fitted {
                                Some((map, FitKind::Offset)) => (LinkKind::Offset, Some(map)),
                                Some((map, FitKind::Affine)) => (LinkKind::Affine, Some(map)),
                                None => (LinkKind::GeneralWcs, None),
                            };
                            links.push(Link {
                                label: dataset.label.clone(),
                                kind,
                                map,
                            });
                        }
                        None => match options.wcs_fallback_scheme {
                            Some(FallbackScheme::Pixels) => {
                                log::warn!(
                                    "'{}' has no valid WCS, falling back to pixel link",
                                    dataset.label
                                );
                                links.push(Link {
                                    label: dataset.label.clone(),
                                    kind: LinkKind::PixelIdentity,
                                    map: None,
                                });
                            }
                            None => {
                                return Err(FramelinkError::MissingCoordinateFrame {
                                    label: dataset.label.clone(),
                                });
                            }
                        },
                    }
                }
            }
        }

        Ok(Self {
            reference: Some(reference.to_string()),
            link_type: options.link_type,
            links,
        })
    }

    /// Carry a pixel position from `label`'s frame into the reference frame.
    pub fn to_reference(
        &self,
        collection: &DataCollection,
        label: &str,
        x: f64,
        y: f64,
    ) -> Result<Mapped, FramelinkError> {
        let reference = self.reference.as_deref().ok_or_else(FramelinkError::no_reference)?;
        if label == reference {
            return Ok(Mapped::exact(x, y));
        }
        let link = self
            .link_for(label)
            .ok_or_else(|| FramelinkError::label_not_linked(label))?;
        match link.kind {
            LinkKind::PixelIdentity => Ok(Mapped::exact(x, y)),
            LinkKind::Affine | LinkKind::Offset => match link.map {
                Some(map) => {
                    let (rx, ry) = map.apply(x, y);
                    Ok(self.flag_bounds(collection, label, x, y, reference, rx, ry))
                }
                None => Ok(Mapped::undefined()),
            },
            LinkKind::GeneralWcs => {
                self.compose_wcs(collection, label, x, y, reference)
            }
        }
    }

    /// Carry a pixel position from the reference frame into `label`'s frame.
    pub fn from_reference(
        &self,
        collection: &DataCollection,
        label: &str,
        x: f64,
        y: f64,
    ) -> Result<Mapped, FramelinkError> {
        let reference = self.reference.as_deref().ok_or_else(FramelinkError::no_reference)?;
        if label == reference {
            return Ok(Mapped::exact(x, y));
        }
        let link = self
            .link_for(label)
            .ok_or_else(|| FramelinkError::label_not_linked(label))?;
        match link.kind {
            LinkKind::PixelIdentity => Ok(Mapped::exact(x, y)),
            LinkKind::Affine | LinkKind::Offset => {
                let inverse = link.map.and_then(|m| m.inverse());
                match inverse {
                    Some(map) => {
                        let (dx, dy) = map.apply(x, y);
                        Ok(self.flag_bounds(collection, reference, x, y, label, dx, dy))
                    }
                    None => Ok(Mapped::undefined()),
                }
            }
            LinkKind::GeneralWcs => {
                self.compose_wcs(collection, reference, x, y, label)
            }
        }
    }

    /// Carry a pixel position between two arbitrary datasets through the
    /// reference frame.
    pub fn transform(
        &self,
        collection: &DataCollection,
        from: &str,
        to: &str,
        x: f64,
        y: f64,
    ) -> Result<Mapped, FramelinkError> {
        if from == to {
            return Ok(Mapped::exact(x, y));
        }
        let step = self.to_reference(collection, from, x, y)?;
        let out = self.from_reference(collection, to, step.x, step.y)?;
        Ok(Mapped {
            x: out.x,
            y: out.y,
            extrapolated: step.extrapolated || out.extrapolated,
        })
    }

    /// How `label` relates to the current reference.
    pub fn status_for(&self, label: &str) -> Result<LinkStatus, FramelinkError> {
        let reference = self.reference.as_deref().ok_or_else(FramelinkError::no_reference)?;
        if label == reference {
            return Ok(LinkStatus::SelfLink);
        }
        self.link_for(label)
            .map(|l| l.kind.status())
            .ok_or_else(|| FramelinkError::label_not_linked(label))
    }

    /// How two labeled datasets relate. Only pairs involving the reference
    /// (or equal labels) have a recorded relation.
    pub fn status_between(&self, a: &str, b: &str) -> Result<LinkStatus, FramelinkError> {
        if a == b {
            return Ok(LinkStatus::SelfLink);
        }
        let reference = self.reference.as_deref().ok_or_else(FramelinkError::no_reference)?;
        let other = if a == reference {
            b
        } else if b == reference {
            a
        } else {
            return Err(FramelinkError::pair_not_linked(a, b));
        };
        self.link_for(other)
            .map(|l| l.kind.status())
            .ok_or_else(|| FramelinkError::pair_not_linked(a, b))
    }

    fn compose_wcs(
        &self,
        collection: &DataCollection,
        from: &str,
        x: f64,
        y: f64,
        to: &str,
    ) -> Result<Mapped, FramelinkError> {
        let from_wcs = collection
            .get(from)
            .and_then(|d| d.adapter.celestial_component())
            .ok_or_else(|| FramelinkError::MissingCoordinateFrame {
                label: from.to_string(),
            })?;
        let to_wcs = collection
            .get(to)
            .and_then(|d| d.adapter.celestial_component())
            .ok_or_else(|| FramelinkError::MissingCoordinateFrame {
                label: to.to_string(),
            })?;
        let world = from_wcs.pixel_to_world(x, y);
        match to_wcs.world_to_pixel(world) {
            Some((tx, ty)) => {
                let extrapolated = !from_wcs.contains(x, y) || !to_wcs.contains(tx, ty);
                Ok(Mapped {
                    x: tx,
                    y: ty,
                    extrapolated,
                })
            }
            None => Ok(Mapped::undefined()),
        }
    }

    fn flag_bounds(
        &self,
        collection: &DataCollection,
        from: &str,
        fx: f64,
        fy: f64,
        to: &str,
        tx: f64,
        ty: f64,
    ) -> Mapped {
        let outside = |label: &str, x: f64, y: f64| {
            collection
                .get(label)
                .and_then(|d| d.adapter.celestial_component())
                .is_some_and(|wcs| !wcs.contains(x, y))
        };
        Mapped {
            x: tx,
            y: ty,
            extrapolated: outside(from, fx, fy) || outside(to, tx, ty),
        }
    }
}

impl fmt::Display for LinkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(reference) => {
                writeln!(
                    f,
                    "{} links ({} mode), reference '{}'",
                    self.links.len(),
                    self.link_type,
                    reference
                )?;
                for link in &self.links {
                    writeln!(f, "  '{}' -> '{}': {:?}", link.label, reference, link.kind)?;
                }
                Ok(())
            }
            None => writeln!(f, "no links"),
        }
    }
}
