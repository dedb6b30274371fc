//! The session: single writer over the collection, link model, viewers, and
//! marker table.
//!
//! All mutations run to completion before the next event is processed.
//! Every read of the link set goes through [`Session::links`] at the moment
//! of use; the set is an immutable value that may be atomically replaced by
//! any mutation.

use crate::annotate::MarkerTable;
use crate::collection::{DataCollection, Dataset, Region, SubsetGroup};
use crate::error::FramelinkError;
use crate::frame::compass::{compass_info, CompassInfo};
use crate::link::{fit_affine, AffineMap, LinkOptions, LinkSet, LinkStatus, LinkType};
use crate::notify::{Notice, Notices};
use crate::orient::{
    build_orientation_dataset, orientation_label, total_rotation, Limits, OrientationManager,
    ViewerState, DEFAULT_ORIENTATION_LABEL,
};
use crate::readout::{compute_readout, Readout};

/// Identifier of the viewer created with every session.
pub const DEFAULT_VIEWER_ID: &str = "viewer-0";

/// Parameters for creating a synthetic orientation layer.
#[derive(Clone, Debug)]
pub struct OrientationOptions {
    /// Rotation in degrees counterclockwise from North-up; `None` means 0.
    pub rotation_angle: Option<f64>,
    pub east_left: bool,
    /// Explicit label; auto-generated from the angle and flip sense when
    /// absent.
    pub label: Option<String>,
    /// Assign as the viewer's reference immediately.
    pub set_on_create: bool,
    /// Base dataset for the new frame; the viewer's first-loaded layer when
    /// absent.
    pub wrt_data: Option<String>,
}

impl Default for OrientationOptions {
    fn default() -> Self {
        Self {
            rotation_angle: None,
            east_left: true,
            label: None,
            set_on_create: true,
            wrt_data: None,
        }
    }
}

/// An interactive analysis session over one data collection.
#[derive(Debug, Default)]
pub struct Session {
    collection: DataCollection,
    links: LinkSet,
    orientation: OrientationManager,
    markers: MarkerTable,
    options: LinkOptions,
    notices: Notices,
}

impl Session {
    pub fn new() -> Self {
        let mut session = Self::default();
        session.orientation.add_viewer(DEFAULT_VIEWER_ID);
        session
    }

    /// Start a session with non-default linking options (from config).
    pub fn with_options(options: LinkOptions) -> Self {
        let mut session = Self::new();
        session.options = options;
        session
    }

    pub fn collection(&self) -> &DataCollection {
        &self.collection
    }

    /// The current link set. Do not cache across mutations.
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    pub fn markers(&self) -> &MarkerTable {
        &self.markers
    }

    pub fn viewer(&self, id: &str) -> Option<&ViewerState> {
        self.orientation.viewer(id)
    }

    pub fn link_options(&self) -> &LinkOptions {
        &self.options
    }

    /// Take the notices produced since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    /// Register an additional viewer. It starts with no layers; use
    /// [`Session::add_data_to_viewer`] to populate it.
    pub fn add_viewer(&mut self, id: &str) {
        let reference = self.links.reference().map(str::to_string);
        let state = self.orientation.add_viewer(id);
        state.reference = reference;
    }

    /// Load a dataset into the collection, show it in the default viewer,
    /// and refresh links under the current scheme.
    pub fn load_dataset(&mut self, dataset: Dataset) -> Result<(), FramelinkError> {
        let label = dataset.label.clone();
        self.collection.add(dataset)?;
        if let Some(state) = self.orientation.viewer_mut(DEFAULT_VIEWER_ID) {
            state.add_layer(label.clone());
        }
        self.notices.push(Notice::DataAdded { label });
        let options = self.options;
        self.link_data(options)
    }

    /// Show an already-loaded dataset in a viewer.
    pub fn add_data_to_viewer(&mut self, viewer: &str, label: &str) -> Result<(), FramelinkError> {
        if self.collection.get(label).is_none() {
            return Err(FramelinkError::label_not_linked(label));
        }
        let state = self
            .orientation
            .viewer_mut(viewer)
            .ok_or_else(|| FramelinkError::label_not_linked(viewer))?;
        state.add_layer(label);
        self.recompute_extents(viewer);
        Ok(())
    }

    /// Recompute all links under the requested scheme.
    ///
    /// The link set is replaced atomically on success; on any failure the
    /// previous set is left completely intact. When `error_on_fail` is
    /// unset, a failed WCS recompute is absorbed silently (the previous
    /// links stay in place) instead of surfacing the error.
    pub fn link_data(&mut self, options: LinkOptions) -> Result<(), FramelinkError> {
        if self.collection.is_empty() {
            return Ok(());
        }

        // Markers pin the link type; check before any mutation.
        if !self.markers.is_empty() && options.link_type != self.links.link_type() {
            return Err(FramelinkError::UnsafeStateTransition(
                "cannot change linking with markers present; clear markers first".to_string(),
            ));
        }

        match self.relink(&options) {
            Ok(()) => Ok(()),
            Err(err) if !options.error_on_fail => {
                log::warn!("link recompute failed, keeping previous links: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn relink(&mut self, options: &LinkOptions) -> Result<(), FramelinkError> {
        let mut created_orientation = false;
        let reference = match options.link_type {
            LinkType::Pixels => self
                .collection
                .first_loaded()
                .map(|d| d.label.clone())
                .ok_or_else(FramelinkError::no_reference)?,
            // WCS mode roots the spanning structure at the oldest surviving
            // orientation layer, creating the shared default at first link.
            LinkType::Wcs => match self.collection.orientation_labels().first() {
                Some(label) => label.to_string(),
                None => {
                    created_orientation = self.ensure_default_orientation()?;
                    DEFAULT_ORIENTATION_LABEL.to_string()
                }
            },
        };

        let new_links = match LinkSet::compute(&self.collection, &reference, options) {
            Ok(links) => links,
            Err(err) => {
                // A failed relink leaves no trace, including the default
                // orientation created for this attempt.
                if created_orientation {
                    self.collection.remove(DEFAULT_ORIENTATION_LABEL);
                }
                return Err(err);
            }
        };

        self.links = new_links;
        self.options = LinkOptions {
            // The affine approximation only applies to WCS linking and
            // reverts to its default in pixel mode.
            wcs_use_affine: match options.link_type {
                LinkType::Pixels => true,
                LinkType::Wcs => options.wcs_use_affine,
            },
            ..*options
        };
        self.notices.push(Notice::LinkUpdated {
            link_type: options.link_type,
            wcs_use_affine: self.options.wcs_use_affine,
        });

        let changed = self
            .orientation
            .apply_link_type(options.link_type, &reference, &reference);
        for (viewer, new_reference) in changed {
            // The view is re-derived in the new frame rather than carried
            // over; the old limits lived in a frame that may no longer
            // apply.
            if let Some(state) = self.orientation.viewer_mut(&viewer) {
                state.limits = None;
            }
            self.after_reference_change(&viewer, &new_reference);
        }

        // A new mapping moves every displayed annotation, including in
        // viewers whose reference did not change.
        let viewer_ids: Vec<String> = self
            .orientation
            .viewer_ids()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for viewer in viewer_ids {
            let reference = self
                .orientation
                .viewer(&viewer)
                .and_then(|s| s.reference.clone());
            self.markers
                .reproject(&self.collection, &self.links, &viewer, reference.as_deref());
        }
        Ok(())
    }

    /// Create the shared base orientation layer at the first WCS link.
    /// Returns true when a layer was created by this call.
    fn ensure_default_orientation(&mut self) -> Result<bool, FramelinkError> {
        if self.collection.get(DEFAULT_ORIENTATION_LABEL).is_some() {
            return Ok(false);
        }
        let base_label = self
            .collection
            .first_celestial()
            .map(|d| d.label.clone())
            .ok_or_else(|| FramelinkError::MissingCoordinateFrame {
                label: self
                    .collection
                    .first_loaded()
                    .map(|d| d.label.clone())
                    .unwrap_or_default(),
            })?;
        let compass = self.compass_of(&base_label)?;
        let east_left = !compass.flip;
        let rotation = total_rotation(&compass, 0.0, east_left);
        let dataset =
            self.build_orientation(&base_label, rotation, east_left, DEFAULT_ORIENTATION_LABEL)?;
        self.collection.add(dataset)?;
        Ok(true)
    }

    fn compass_of(&self, label: &str) -> Result<CompassInfo, FramelinkError> {
        let dataset = self
            .collection
            .get(label)
            .ok_or_else(|| FramelinkError::label_not_linked(label))?;
        let wcs = dataset.adapter.celestial_component().ok_or_else(|| {
            FramelinkError::MissingCoordinateFrame {
                label: label.to_string(),
            }
        })?;
        compass_info(wcs, dataset.shape).ok_or_else(|| FramelinkError::MissingCoordinateFrame {
            label: label.to_string(),
        })
    }

    fn build_orientation(
        &self,
        base_label: &str,
        rotation_deg: f64,
        east_left: bool,
        label: &str,
    ) -> Result<Dataset, FramelinkError> {
        let base = self
            .collection
            .get(base_label)
            .ok_or_else(|| FramelinkError::label_not_linked(base_label))?;
        let wcs = base.adapter.celestial_component().ok_or_else(|| {
            FramelinkError::MissingCoordinateFrame {
                label: base_label.to_string(),
            }
        })?;
        let (ny, nx) = base.shape;
        let center = wcs.pixel_to_world(nx as f64 / 2.0, ny as f64 / 2.0);
        Ok(build_orientation_dataset(
            base,
            center,
            wcs.pixel_scale(),
            rotation_deg,
            east_left,
            label,
        ))
    }

    /// How `label` relates to the current link reference.
    pub fn get_link_type(&self, label: &str) -> Result<LinkStatus, FramelinkError> {
        self.links.status_for(label)
    }

    /// How two labeled datasets relate.
    pub fn get_link_type_between(&self, a: &str, b: &str) -> Result<LinkStatus, FramelinkError> {
        self.links.status_between(a, b)
    }

    /// Change a viewer's reference dataset, carrying the current view over
    /// to the new frame.
    pub fn set_reference(&mut self, viewer: &str, label: &str) -> Result<(), FramelinkError> {
        if self.collection.get(label).is_none() {
            return Err(FramelinkError::label_not_linked(label));
        }
        let link_type = self.links.link_type();
        let old = self
            .orientation
            .set_reference(viewer, label, link_type)
            .ok_or_else(|| FramelinkError::label_not_linked(viewer))?;
        if old.as_deref() != Some(label) {
            if let Some(old_ref) = old {
                self.transform_limits(viewer, &old_ref, label);
            }
            self.after_reference_change(viewer, label);
        }
        Ok(())
    }

    fn transform_limits(&mut self, viewer: &str, old_ref: &str, new_ref: &str) {
        let limits = self.orientation.viewer(viewer).and_then(|s| s.limits);
        if let Some(limits) = limits {
            let mut points = Vec::with_capacity(4);
            for (x, y) in limits.corners() {
                if let Ok(mapped) = self.links.transform(&self.collection, old_ref, new_ref, x, y)
                {
                    if mapped.x.is_finite() && mapped.y.is_finite() {
                        points.push((mapped.x, mapped.y));
                    }
                }
            }
            if points.len() == 4 {
                if let Some(state) = self.orientation.viewer_mut(viewer) {
                    state.limits = Some(Limits::from_points(&points));
                }
                return;
            }
        }
        if let Some(state) = self.orientation.viewer_mut(viewer) {
            state.limits = None;
        }
    }

    fn after_reference_change(&mut self, viewer: &str, reference: &str) {
        if self
            .orientation
            .viewer(viewer)
            .map_or(true, |s| s.limits.is_none())
        {
            self.recompute_extents(viewer);
        }
        self.markers
            .reproject(&self.collection, &self.links, viewer, Some(reference));
        self.notices.push(Notice::RefDataChanged {
            viewer: viewer.to_string(),
            reference: reference.to_string(),
        });
    }

    /// Fit the viewer's limits to the union of its loaded layers, expressed
    /// in the reference frame.
    pub fn recompute_extents(&mut self, viewer: &str) {
        let Some(state) = self.orientation.viewer(viewer) else {
            return;
        };
        let Some(reference) = state.reference.clone() else {
            return;
        };
        let layers: Vec<String> = state.layers.clone();
        let mut points = Vec::new();
        for label in &layers {
            let Some(dataset) = self.collection.get(label) else {
                continue;
            };
            for (x, y) in Limits::for_shape(dataset.shape).corners() {
                if let Ok(mapped) =
                    self.links.transform(&self.collection, label, &reference, x, y)
                {
                    if mapped.x.is_finite() && mapped.y.is_finite() {
                        points.push((mapped.x, mapped.y));
                    }
                }
            }
        }
        if let Some(state) = self.orientation.viewer_mut(viewer) {
            state.limits = if points.is_empty() {
                None
            } else {
                Some(Limits::from_points(&points))
            };
        }
    }

    /// Corners of the viewer's current limits expressed in `label`'s frame.
    pub fn zoom_limits(
        &self,
        viewer: &str,
        label: &str,
    ) -> Result<[(f64, f64); 4], FramelinkError> {
        let state = self
            .orientation
            .viewer(viewer)
            .ok_or_else(|| FramelinkError::label_not_linked(viewer))?;
        let reference = state
            .reference
            .clone()
            .ok_or_else(FramelinkError::no_reference)?;
        let limits = state.limits.ok_or_else(FramelinkError::no_reference)?;
        let mut corners = [(0.0, 0.0); 4];
        for (i, (x, y)) in limits.corners().into_iter().enumerate() {
            let mapped = self.links.transform(&self.collection, &reference, label, x, y)?;
            corners[i] = (mapped.x, mapped.y);
        }
        Ok(corners)
    }

    /// Toggle which loaded dataset is topmost in a viewer.
    pub fn blink(&mut self, viewer: &str) {
        if let Some(state) = self.orientation.viewer_mut(viewer) {
            state.blink_once();
        }
    }

    /// Resolve a device position in a viewer into the full readout.
    pub fn readout(&self, viewer: &str, x: f64, y: f64) -> Result<Readout, FramelinkError> {
        let state = self
            .orientation
            .viewer(viewer)
            .ok_or_else(|| FramelinkError::label_not_linked(viewer))?;
        compute_readout(&self.collection, &self.links, state, x, y)
    }

    /// Place a marker at a device position. Markers pin the current link
    /// type until cleared.
    pub fn add_marker(&mut self, viewer: &str, x: f64, y: f64) -> Result<(), FramelinkError> {
        let readout = self.readout(viewer, x, y)?;
        self.markers.add_from_readout(viewer, &readout, (x, y));
        self.notices.push(Notice::MarkersChanged { has_markers: true });
        Ok(())
    }

    /// Remove the marker nearest a device position in a viewer.
    pub fn remove_marker_near(&mut self, viewer: &str, x: f64, y: f64) {
        let cursor_world = self
            .orientation
            .viewer(viewer)
            .and_then(|s| s.reference.as_deref())
            .and_then(|r| self.collection.get(r))
            .and_then(|d| d.adapter.pixel_to_world(x, y));
        self.markers
            .remove_nearest(viewer, x, y, self.links.link_type(), cursor_world);
        self.notices.push(Notice::MarkersChanged {
            has_markers: !self.markers.is_empty(),
        });
    }

    /// Clear all markers, unpinning the link type.
    pub fn clear_markers(&mut self) {
        self.markers.clear();
        self.notices.push(Notice::MarkersChanged { has_markers: false });
    }

    /// Create a subset anchored to the viewer's current reference frame.
    pub fn add_subset(
        &mut self,
        label: impl Into<String>,
        viewer: &str,
        region: Region,
    ) -> Result<(), FramelinkError> {
        let parent = self
            .orientation
            .viewer(viewer)
            .and_then(|s| s.reference.clone())
            .ok_or_else(FramelinkError::no_reference)?;
        self.collection.subset_groups.push(SubsetGroup {
            label: label.into(),
            parent,
            region,
        });
        Ok(())
    }

    /// Create a synthetic orientation layer. Requires WCS linking.
    ///
    /// Returns the label of the orientation (existing or created).
    pub fn add_orientation(
        &mut self,
        viewer: &str,
        options: OrientationOptions,
    ) -> Result<String, FramelinkError> {
        if self.links.link_type() != LinkType::Wcs {
            return Err(FramelinkError::UnsafeStateTransition(
                "orientation layers require WCS linking".to_string(),
            ));
        }
        let rotation_angle = options.rotation_angle.unwrap_or(0.0);
        let label = options
            .label
            .unwrap_or_else(|| orientation_label(rotation_angle, options.east_left));

        if self.collection.get(&label).is_none() {
            let base_label = match options.wrt_data {
                Some(label) => label,
                None => self.bottom_layer(viewer)?,
            };
            let compass = self.compass_of(&base_label)?;
            let rotation = total_rotation(&compass, rotation_angle, options.east_left);
            let dataset =
                self.build_orientation(&base_label, rotation, options.east_left, &label)?;
            self.collection.add(dataset)?;
            let link_options = self.options;
            if let Err(err) = self.relink(&link_options) {
                self.collection.remove(&label);
                return Err(err);
            }
        }

        if options.set_on_create {
            self.set_reference(viewer, &label)?;
        }
        Ok(label)
    }

    /// North-up, East-left orientation of the viewer's base layer.
    pub fn create_north_up_east_left(
        &mut self,
        viewer: &str,
        set_on_create: bool,
    ) -> Result<String, FramelinkError> {
        let base = self.bottom_layer(viewer)?;
        let compass = self.compass_of(&base)?;
        self.add_orientation(
            viewer,
            OrientationOptions {
                rotation_angle: Some(compass.degn),
                east_left: true,
                label: Some("North-up, East-left".to_string()),
                set_on_create,
                wrt_data: Some(base),
            },
        )
    }

    /// North-up, East-right orientation of the viewer's base layer.
    pub fn create_north_up_east_right(
        &mut self,
        viewer: &str,
        set_on_create: bool,
    ) -> Result<String, FramelinkError> {
        let base = self.bottom_layer(viewer)?;
        let compass = self.compass_of(&base)?;
        self.add_orientation(
            viewer,
            OrientationOptions {
                rotation_angle: Some(180.0 - compass.degn),
                east_left: false,
                label: Some("North-up, East-right".to_string()),
                set_on_create,
                wrt_data: Some(base),
            },
        )
    }

    /// First-loaded (bottom) layer of a viewer.
    fn bottom_layer(&self, viewer: &str) -> Result<String, FramelinkError> {
        self.orientation
            .viewer(viewer)
            .and_then(|s| s.layers.first().cloned())
            .ok_or_else(FramelinkError::no_reference)
    }

    /// Remove a dataset (or orientation layer) from the collection.
    ///
    /// Subsets anchored to it are reparented to the fallback reference with
    /// their geometry re-expressed in the new frame. Fails when a live
    /// viewer references the dataset and no fallback exists.
    pub fn remove_data(&mut self, label: &str) -> Result<(), FramelinkError> {
        if self.collection.get(label).is_none() {
            return Err(FramelinkError::label_not_linked(label));
        }

        let referencing: Vec<String> = self
            .orientation
            .viewers_referencing(label)
            .iter()
            .map(|s| s.to_string())
            .collect();
        let has_subsets = self
            .collection
            .subset_groups
            .iter()
            .any(|s| s.parent == label);

        let fallback = self.fallback_reference(label);
        if !referencing.is_empty() && fallback.is_none() {
            return Err(FramelinkError::UnsafeStateTransition(format!(
                "'{label}' is the reference of viewer '{}' and no other \
                 orientation is available to fall back to",
                referencing[0]
            )));
        }

        if has_subsets {
            match &fallback {
                Some(fallback) => self.reparent_subsets(label, fallback),
                None => {
                    log::warn!("dropping subsets anchored to '{label}': no fallback frame");
                    self.collection.subset_groups.retain(|s| s.parent != label);
                }
            }
        }
        self.orientation.replace_references(label, fallback.as_deref());

        self.collection.remove(label);
        self.notices.push(Notice::DataRemoved {
            label: label.to_string(),
        });

        // Rebuild the spanning structure without the removed dataset.
        if self.collection.is_empty() {
            self.links = LinkSet::empty();
        } else {
            let options = self.options;
            self.link_data(options)?;
        }

        for viewer in referencing {
            let reference = self
                .orientation
                .viewer(&viewer)
                .and_then(|s| s.reference.clone());
            if let Some(reference) = reference {
                if let Some(state) = self.orientation.viewer_mut(&viewer) {
                    state.limits = None;
                }
                self.after_reference_change(&viewer, &reference);
            }
        }
        Ok(())
    }

    /// Next reference to fall back to when `label` goes away: the default
    /// viewer's current orientation when it survives, else another
    /// orientation layer under WCS linking, else the next loaded dataset
    /// under pixel linking.
    fn fallback_reference(&self, label: &str) -> Option<String> {
        match self.links.link_type() {
            LinkType::Wcs => {
                let current = self
                    .orientation
                    .viewer(DEFAULT_VIEWER_ID)
                    .and_then(|s| s.reference.as_deref());
                if let Some(current) = current {
                    if current != label
                        && self
                            .collection
                            .get(current)
                            .is_some_and(|d| d.origin.is_orientation())
                    {
                        return Some(current.to_string());
                    }
                }
                self.collection
                    .orientation_labels()
                    .iter()
                    .find(|l| **l != label)
                    .map(|l| l.to_string())
            }
            LinkType::Pixels => self
                .collection
                .iter()
                .find(|d| d.label != label && !d.origin.is_orientation())
                .map(|d| d.label.clone()),
        }
    }

    fn reparent_subsets(&mut self, old_parent: &str, new_parent: &str) {
        let map = self.frame_map(old_parent, new_parent);
        let mut updates: Vec<(usize, Region)> = Vec::new();
        for (idx, subset) in self.collection.subset_groups.iter().enumerate() {
            if subset.parent != old_parent {
                continue;
            }
            let (cx, cy) = subset.region.center();
            let new_region = match &map {
                Some(map) => {
                    let (nx, ny) = map.apply(cx, cy);
                    let dtheta = match subset.region {
                        Region::Ellipse { theta, .. } => map.transform_angle(theta) - theta,
                        _ => 0.0,
                    };
                    subset.region.recentered(nx, ny, dtheta)
                }
                None => match self
                    .links
                    .transform(&self.collection, old_parent, new_parent, cx, cy)
                {
                    Ok(mapped) => subset.region.recentered(mapped.x, mapped.y, 0.0),
                    Err(_) => subset.region,
                },
            };
            updates.push((idx, new_region));
        }
        for (idx, region) in updates {
            let subset = &mut self.collection.subset_groups[idx];
            subset.region = region;
            subset.parent = new_parent.to_string();
            log::debug!(
                "reparented subset '{}' from '{}' to '{}'",
                subset.label,
                old_parent,
                new_parent
            );
        }
    }

    /// Affine map carrying `from`-frame pixels onto `to`-frame pixels, when
    /// both frames support one.
    fn frame_map(&self, from: &str, to: &str) -> Option<AffineMap> {
        let from_data = self.collection.get(from)?;
        let to_data = self.collection.get(to)?;
        let from_wcs = from_data.adapter.celestial_component()?;
        let to_wcs = to_data.adapter.celestial_component()?;
        fit_affine(from_wcs, from_data.shape, to_wcs).map(|(map, _)| map)
    }
}
