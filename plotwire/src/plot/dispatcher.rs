//! Plot request normalization.
//!
//! [`PlotDispatcher`] turns user-level plotting calls into canonical renderer
//! calls, keeping the per-view axis registries in step. Arguments are
//! validated before anything is sent. Once a multi-call sequence has started
//! a failure is returned as is: calls already issued are not undone, and the
//! local registries keep whatever was resolved.

use std::time::Instant;

use super::axes::{AxisChange, AxisSpec, Direction};
use super::bean::{Bean, RoiKind};
use super::error::PlotError;
use super::renderer::{RemoteCall, RemoteRenderer, methods};
use super::series::{Series, SeriesArg};
use super::session::PlotSession;
use crate::bridge::dataset::Dataset;
use crate::bridge::staging::StagingArea;
use crate::bridge::value::Value;
use crate::config::{DEFAULT_EXPORT_FILENAME, Settings};

pub const IMAGE_EXPLORER_VIEW: &str = "ImageExplorer View";
pub const NEXUS_TREE_VIEW: &str = "hdf5TreeViewer";
pub const VOLUME_VIEW: &str = "Remote Volume Viewer";

/// What a line call does to the existing plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMode {
    /// Clear the view and its axes first.
    Fresh,
    /// Add to the current plot, extending axes as needed.
    Add,
    /// Swap displayed data only; axes are left alone.
    Update,
}

/// Arguments of a line plot.
///
/// When only `x` is given it is plotted as `y` against the index.
#[derive(Debug, Clone, Default)]
pub struct LinePlot {
    pub x: Option<SeriesArg>,
    pub y: Option<SeriesArg>,
    pub title: Option<String>,
    pub view: Option<String>,
}

impl LinePlot {
    pub fn new(y: impl Into<SeriesArg>) -> Self {
        Self {
            y: Some(y.into()),
            ..Self::default()
        }
    }

    pub fn against(mut self, x: impl Into<SeriesArg>) -> Self {
        self.x = Some(x.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }
}

/// Coordinates for a point plot.
#[derive(Debug, Clone)]
pub enum PointCoords {
    /// Datasets of (x, y) coordinate pairs.
    Pairs(Vec<Dataset>),
    Xy(Dataset, Dataset),
    Xyz(Dataset, Dataset, Dataset),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointSize {
    /// One size for every point, sent as a zero-dimensional int32 array.
    Uniform(i32),
    PerPoint(Dataset),
}

impl Default for PointSize {
    fn default() -> Self {
        Self::Uniform(0)
    }
}

impl PointSize {
    fn into_value(self) -> Value {
        match self {
            Self::Uniform(size) => Value::from(Dataset::scalar_i32(size)),
            Self::PerPoint(sizes) => Value::from(sizes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Svg,
    Postscript,
    PngJpeg,
}

impl ExportFormat {
    /// Parse a user format name; `None` selects SVG.
    pub fn parse(format: Option<&str>) -> Result<Self, PlotError> {
        let Some(format) = format else {
            return Ok(Self::Svg);
        };
        match format.to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "ps" | "eps" => Ok(Self::Postscript),
            "png" | "jpg" | "jpeg" => Ok(Self::PngJpeg),
            _ => Err(PlotError::invalid_argument(format!(
                "export format '{format}' not one of svg, ps, eps, png, jpg"
            ))),
        }
    }

    /// Name the renderer uses for this file type.
    pub fn renderer_name(self) -> &'static str {
        match self {
            Self::Svg => "SVG File",
            Self::Postscript => "Postscript File",
            Self::PngJpeg => "PNG/JPEG File",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOrder {
    #[default]
    None,
    Alpha,
    Chrono,
}

impl ImageOrder {
    pub fn parse(order: &str) -> Result<Self, PlotError> {
        match order {
            "none" => Ok(Self::None),
            "alpha" => Ok(Self::Alpha),
            "chrono" => Ok(Self::Chrono),
            _ => Err(PlotError::invalid_argument(format!(
                "given order '{order}' not one of none, alpha, chrono"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Alpha => "alpha",
            Self::Chrono => "chrono",
        }
    }
}

/// Arguments of an image directory scan.
#[derive(Debug, Clone)]
pub struct ImageScan {
    pub path: String,
    pub order: ImageOrder,
    /// Regular expression prefix for file names.
    pub prefix: Option<String>,
    /// File name endings, each may be a regular expression.
    pub suffixes: Option<Vec<String>>,
    /// Grid columns; -1 makes the grid square.
    pub columns: i32,
    pub row_major: bool,
    pub view: Option<String>,
}

impl ImageScan {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order: ImageOrder::None,
            prefix: None,
            suffixes: None,
            columns: -1,
            row_major: true,
            view: None,
        }
    }
}

struct NormalizedLine {
    view: String,
    title: Value,
    xs: Option<Vec<Series>>,
    ys: Vec<Series>,
}

pub struct PlotDispatcher<R> {
    renderer: R,
    session: PlotSession,
    staging: StagingArea,
    export_filename: String,
}

impl<R: RemoteRenderer> PlotDispatcher<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            session: PlotSession::default(),
            staging: StagingArea::default(),
            export_filename: DEFAULT_EXPORT_FILENAME.to_string(),
        }
    }

    pub fn with_settings(renderer: R, settings: &Settings) -> Self {
        Self {
            renderer,
            session: PlotSession::new(settings.default_view()),
            staging: settings.staging_area(),
            export_filename: settings.export_filename.clone(),
        }
    }

    pub fn session(&self) -> &PlotSession {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Set the view used when a call names none.
    pub fn set_default_view(&mut self, view: impl Into<String>) {
        self.session.set_default_view(view);
    }

    async fn send(&mut self, method: &'static str, args: Vec<Value>) -> Result<Value, PlotError> {
        let start = Instant::now();
        let result = self.renderer.invoke(RemoteCall::new(method, args)).await;
        match &result {
            Ok(_) => tracing::debug!(
                method,
                duration_ms = start.elapsed().as_millis() as u64,
                "Renderer call completed"
            ),
            Err(e) => tracing::warn!(method, error = %e, "Renderer call failed"),
        }
        Ok(result?)
    }

    // Lines

    pub async fn line(&mut self, plot: LinePlot) -> Result<(), PlotError> {
        self.process_line(plot, PlotMode::Fresh).await
    }

    pub async fn add_line(&mut self, plot: LinePlot) -> Result<(), PlotError> {
        self.process_line(plot, PlotMode::Add).await
    }

    pub async fn update_line(&mut self, plot: LinePlot) -> Result<(), PlotError> {
        self.process_line(plot, PlotMode::Update).await
    }

    pub async fn process_line(&mut self, plot: LinePlot, mode: PlotMode) -> Result<(), PlotError> {
        let line = self.normalize_line(plot)?;
        tracing::debug!(
            view = %line.view,
            ?mode,
            x_series = line.xs.as_ref().map_or(0, Vec::len),
            y_series = line.ys.len(),
            "Dispatching line plot"
        );

        if mode == PlotMode::Update {
            let xl = line
                .xs
                .map_or(Value::Null, |xs| series_data(xs).into());
            let yl = Value::from(series_data(line.ys));
            self.send(
                methods::UPDATE_LINE,
                vec![line.view.into(), line.title, xl, yl, Value::Null, Value::Null],
            )
            .await?;
            return Ok(());
        }

        if mode == PlotMode::Fresh {
            self.send(methods::CLEAR, vec![Value::from(line.view.as_str())])
                .await?;
            self.session.clear_view(&line.view);
        }

        let x_axes = match &line.xs {
            Some(xs) => Some(self.resolve_axes(&line.view, Direction::X, xs).await?),
            None => None,
        };
        let y_axes = self.resolve_axes(&line.view, Direction::Y, &line.ys).await?;

        // A single shared x goes out once.
        let xs = line.xs.map_or(Value::Null, |xs| series_data(xs).into());
        let args = vec![
            Value::from(line.view),
            line.title,
            xs,
            Value::from(series_data(line.ys)),
            Value::from(x_axes),
            Value::from(y_axes),
        ];
        let method = if mode == PlotMode::Fresh {
            methods::LINE
        } else {
            methods::ADD_LINE
        };
        self.send(method, args).await?;
        Ok(())
    }

    fn normalize_line(&self, plot: LinePlot) -> Result<NormalizedLine, PlotError> {
        let (x, y) = match (plot.x, plot.y) {
            (x, Some(y)) => (x, y),
            (Some(x), None) => (None, x),
            (None, None) => return Err(PlotError::invalid_argument("no data to plot")),
        };
        let ys = y.into_vec();
        if ys.is_empty() {
            return Err(PlotError::invalid_argument("no y datasets given"));
        }
        let xs = x.map(SeriesArg::into_vec).filter(|xs| !xs.is_empty());

        if let Some(xs) = &xs {
            if xs.len() == 1 {
                let expected = xs[0].len();
                if let Some(bad) = ys.iter().find(|y| y.len() != expected) {
                    return Err(PlotError::ShapeMismatch {
                        expected,
                        got: bad.len(),
                    });
                }
            } else if xs.len() != ys.len() {
                return Err(PlotError::CountMismatch {
                    x: xs.len(),
                    y: ys.len(),
                });
            } else if let Some((x, y)) = xs.iter().zip(&ys).find(|(x, y)| x.len() != y.len()) {
                return Err(PlotError::ShapeMismatch {
                    expected: x.len(),
                    got: y.len(),
                });
            }
        }

        Ok(NormalizedLine {
            view: self.session.view_name(plot.view.as_deref()),
            title: Value::from(plot.title),
            xs,
            ys,
        })
    }

    /// Resolve one batch against the view's registry and mirror the changes
    /// on the renderer, in order.
    async fn resolve_axes(
        &mut self,
        view: &str,
        direction: Direction,
        series: &[Series],
    ) -> Result<Vec<String>, PlotError> {
        let specs: Vec<Option<&AxisSpec>> = series.iter().map(|s| s.axis.as_ref()).collect();
        let (names, changes) = self
            .session
            .view_mut(view)
            .axes_mut(direction)
            .resolve_batch(&specs);

        for change in changes {
            match change {
                AxisChange::Rename { name } => {
                    tracing::debug!(view, ?direction, axis = %name, "Renaming active axis");
                    let method = match direction {
                        Direction::X => methods::RENAME_ACTIVE_X_AXIS,
                        Direction::Y => methods::RENAME_ACTIVE_Y_AXIS,
                    };
                    self.send(method, vec![Value::from(view), Value::from(name)])
                        .await?;
                }
                AxisChange::Create { name, placement } => {
                    tracing::debug!(view, ?direction, axis = %name, %placement, "Creating axis");
                    self.send(
                        methods::CREATE_AXIS,
                        vec![
                            Value::from(view),
                            Value::from(name),
                            Value::from(placement.as_str()),
                        ],
                    )
                    .await?;
                }
            }
        }
        Ok(names)
    }

    // Images and surfaces

    pub async fn image(
        &mut self,
        image: Dataset,
        x: Option<Dataset>,
        y: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let (x, y) = paired_axes(x, y);
        let view = self.session.view_name(view);
        self.send(methods::IMAGE, vec![view.into(), x, y, image.into()])
            .await?;
        Ok(())
    }

    pub async fn images(
        &mut self,
        images: Vec<Dataset>,
        x: Option<Dataset>,
        y: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let (x, y) = paired_axes(x, y);
        let view = self.session.view_name(view);
        self.send(methods::IMAGES, vec![view.into(), x, y, images.into()])
            .await?;
        Ok(())
    }

    pub async fn surface(
        &mut self,
        surface: Dataset,
        x: Option<Dataset>,
        y: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let (x, y) = paired_axes(x, y);
        let view = self.session.view_name(view);
        self.send(methods::SURFACE, vec![view.into(), x, y, surface.into()])
            .await?;
        Ok(())
    }

    // Stacks

    /// Plot each y against the corresponding x as a 3D stack.
    ///
    /// Without `y`, `x` is plotted against the index of its longest dataset.
    pub async fn stack(
        &mut self,
        x: Vec<Dataset>,
        y: Option<Vec<Dataset>>,
        z: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        self.send_stack(methods::STACK, x, y, z, view).await
    }

    pub async fn update_stack(
        &mut self,
        x: Vec<Dataset>,
        y: Option<Vec<Dataset>>,
        z: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        self.send_stack(methods::UPDATE_STACK, x, y, z, view).await
    }

    async fn send_stack(
        &mut self,
        method: &'static str,
        x: Vec<Dataset>,
        y: Option<Vec<Dataset>>,
        z: Option<Dataset>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let (xs, ys) = match y.filter(|y| !y.is_empty()) {
            Some(ys) => (x, ys),
            None => {
                let longest = x.iter().map(Dataset::size).max().unwrap_or(0);
                (vec![Dataset::arange(longest)], x)
            }
        };
        if ys.is_empty() {
            return Err(PlotError::invalid_argument("no datasets to stack"));
        }
        let view = self.session.view_name(view);
        self.send(
            method,
            vec![view.into(), xs.into(), ys.into(), Value::from(z)],
        )
        .await?;
        Ok(())
    }

    // Points

    pub async fn points(
        &mut self,
        coords: PointCoords,
        size: PointSize,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let view = Value::from(self.session.view_name(view));
        let size = size.into_value();
        let (method, args) = match coords {
            PointCoords::Pairs(pairs) => (methods::POINTS_2D, vec![view, pairs.into(), size]),
            PointCoords::Xy(x, y) => (methods::POINTS_2D, vec![view, x.into(), y.into(), size]),
            PointCoords::Xyz(x, y, z) => (
                methods::POINTS_3D,
                vec![view, x.into(), y.into(), z.into(), size],
            ),
        };
        self.send(method, args).await?;
        Ok(())
    }

    /// Add points to an existing point plot. Coordinate pairs are not
    /// accepted here; give x and y separately.
    pub async fn add_points(
        &mut self,
        coords: PointCoords,
        size: PointSize,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let view = Value::from(self.session.view_name(view));
        let size = size.into_value();
        let (method, args) = match coords {
            PointCoords::Pairs(_) => {
                return Err(PlotError::invalid_argument(
                    "adding points needs separate x and y coordinates",
                ));
            }
            PointCoords::Xy(x, y) => (
                methods::UPDATE_POINTS_2D,
                vec![view, x.into(), y.into(), size],
            ),
            PointCoords::Xyz(x, y, z) => (
                methods::UPDATE_POINTS_3D,
                vec![view, x.into(), y.into(), z.into(), size],
            ),
        };
        self.send(method, args).await?;
        Ok(())
    }

    // Volume

    /// Show a volume, passing it to the renderer as a staged file.
    ///
    /// The data is first cast to a type the volume viewer accepts. The file
    /// is removed once the call returns, whether or not it succeeded.
    pub async fn volume(&mut self, volume: Dataset, view: Option<&str>) -> Result<(), PlotError> {
        let view = view.unwrap_or(VOLUME_VIEW).to_string();
        let volume = volume.normalized_for_volume();
        let staged = self.staging.stage(&volume)?;
        let path = staged.path().to_string_lossy().into_owned();
        let result = self
            .send(methods::VOLUME, vec![view.into(), path.into()])
            .await;
        drop(staged);
        result.map(|_| ())
    }

    // View management

    /// Clear the view on the renderer and reset its local axes.
    pub async fn clear(&mut self, view: Option<&str>) -> Result<(), PlotError> {
        let view = self.session.view_name(view);
        self.send(methods::CLEAR, vec![Value::from(view.as_str())])
            .await?;
        self.session.clear_view(&view);
        Ok(())
    }

    pub async fn export(
        &mut self,
        view: Option<&str>,
        format: Option<&str>,
        path: Option<&str>,
    ) -> Result<(), PlotError> {
        let format = ExportFormat::parse(format)?;
        let view = self.session.view_name(view);
        let path = path.unwrap_or(&self.export_filename).to_string();
        self.send(
            methods::EXPORT,
            vec![view.into(), format.renderer_name().into(), path.into()],
        )
        .await?;
        Ok(())
    }

    /// Load images found under a directory into an image explorer view.
    ///
    /// Returns the number of images loaded, if the renderer reports it.
    pub async fn scan_for_images(&mut self, scan: ImageScan) -> Result<Option<i64>, PlotError> {
        let view = scan.view.unwrap_or_else(|| IMAGE_EXPLORER_VIEW.to_string());
        let result = self
            .send(
                methods::SCAN_FOR_IMAGES,
                vec![
                    view.into(),
                    scan.path.into(),
                    scan.order.as_str().into(),
                    scan.prefix.into(),
                    scan.suffixes.into(),
                    scan.columns.into(),
                    scan.row_major.into(),
                    i32::MAX.into(),
                    Value::Int(1),
                ],
            )
            .await?;
        Ok(result.as_i64())
    }

    pub async fn view_nexus(&mut self, tree: Value, view: Option<&str>) -> Result<(), PlotError> {
        let view = view.unwrap_or(NEXUS_TREE_VIEW).to_string();
        self.send(methods::VIEW_NEXUS_TREE, vec![view.into(), tree])
            .await?;
        Ok(())
    }

    /// Names of the renderer's GUI views.
    pub async fn gui_names(&mut self) -> Result<Vec<String>, PlotError> {
        match self.send(methods::GET_GUI_NAMES, Vec::new()).await? {
            Value::Null => Ok(Vec::new()),
            Value::List(names) => names
                .into_iter()
                .map(|n| match n {
                    Value::String(s) => Ok(s),
                    other => Err(PlotError::unsupported_type(format!(
                        "GUI name must be a string, got {}",
                        other.kind()
                    ))),
                })
                .collect(),
            other => Err(PlotError::unsupported_type(format!(
                "expected a list of GUI names, got {}",
                other.kind()
            ))),
        }
    }

    // Beans

    pub async fn get_bean(&mut self, view: Option<&str>) -> Result<Option<Bean>, PlotError> {
        let view = self.session.view_name(view);
        Bean::from_value(self.send(methods::GET_BEAN, vec![view.into()]).await?)
    }

    /// Send `bean` to the view. Nothing is sent for `None`.
    pub async fn set_bean(&mut self, bean: Option<Bean>, view: Option<&str>) -> Result<(), PlotError> {
        let Some(bean) = bean else {
            return Ok(());
        };
        let view = self.session.view_name(view);
        self.send(methods::SET_BEAN, vec![view.into(), bean.into_value()])
            .await?;
        Ok(())
    }

    pub async fn get_data_bean(&mut self, view: Option<&str>) -> Result<Option<Bean>, PlotError> {
        let view = self.session.view_name(view);
        Bean::from_value(self.send(methods::GET_DATA_BEAN, vec![view.into()]).await?)
    }

    pub async fn set_data_bean(
        &mut self,
        bean: Option<Bean>,
        view: Option<&str>,
    ) -> Result<(), PlotError> {
        let Some(bean) = bean else {
            return Ok(());
        };
        let view = self.session.view_name(view);
        self.send(methods::SET_DATA_BEAN, vec![view.into(), bean.into_value()])
            .await?;
        Ok(())
    }

    // Regions of interest, read from and written back to the view's bean

    pub async fn get_roi(
        &mut self,
        kind: Option<RoiKind>,
        view: Option<&str>,
    ) -> Result<Option<Value>, PlotError> {
        let bean = self.get_bean(view).await?;
        Ok(bean.and_then(|b| b.roi(kind).cloned()))
    }

    /// Store `roi` in the view's bean and send it back.
    ///
    /// A view without a bean is left alone: nothing is sent and `None` is
    /// returned.
    pub async fn set_roi(&mut self, roi: Value, view: Option<&str>) -> Result<Option<Bean>, PlotError> {
        let Some(mut bean) = self.get_bean(view).await? else {
            return Ok(None);
        };
        bean.set_roi(roi);
        self.set_bean(Some(bean.clone()), view).await?;
        Ok(Some(bean))
    }

    pub async fn del_roi(
        &mut self,
        kind: Option<RoiKind>,
        view: Option<&str>,
    ) -> Result<Option<Bean>, PlotError> {
        let Some(mut bean) = self.get_bean(view).await? else {
            return Ok(None);
        };
        bean.del_roi(kind);
        self.set_bean(Some(bean.clone()), view).await?;
        Ok(Some(bean))
    }

    pub async fn get_rois(
        &mut self,
        kind: Option<RoiKind>,
        view: Option<&str>,
    ) -> Result<Option<indexmap::IndexMap<String, Value>>, PlotError> {
        let bean = self.get_bean(view).await?;
        Ok(bean.and_then(|b| b.rois(kind)))
    }

    /// Like [`set_roi`](Self::set_roi) for the ROI list. An unsupported list
    /// is rejected even when the view has no bean.
    pub async fn set_rois(
        &mut self,
        rois: Vec<Value>,
        view: Option<&str>,
    ) -> Result<Option<Bean>, PlotError> {
        let Some(mut bean) = self.get_bean(view).await? else {
            Bean::new().set_rois(rois)?;
            return Ok(None);
        };
        bean.set_rois(rois)?;
        self.set_bean(Some(bean.clone()), view).await?;
        Ok(Some(bean))
    }

    pub async fn del_rois(
        &mut self,
        kind: Option<RoiKind>,
        view: Option<&str>,
    ) -> Result<Option<Bean>, PlotError> {
        let Some(mut bean) = self.get_bean(view).await? else {
            return Ok(None);
        };
        bean.del_rois(kind);
        self.set_bean(Some(bean.clone()), view).await?;
        Ok(Some(bean))
    }

    /// Files selected in the view, sorted.
    pub async fn get_files(&mut self, view: Option<&str>) -> Result<Option<Vec<String>>, PlotError> {
        let bean = self.get_bean(view).await?;
        let files = bean.and_then(|b| b.files());
        if files.is_none() {
            tracing::info!("No file selection has been sent to the server");
        }
        Ok(files)
    }
}

fn series_data(series: Vec<Series>) -> Vec<Value> {
    series.into_iter().map(|s| Value::from(s.data)).collect()
}

/// Image axes are sent only as a pair.
fn paired_axes(x: Option<Dataset>, y: Option<Dataset>) -> (Value, Value) {
    match (x, y) {
        (Some(x), Some(y)) => (x.into(), y.into()),
        _ => (Value::Null, Value::Null),
    }
}
