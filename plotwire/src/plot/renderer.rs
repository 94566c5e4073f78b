//! Boundary to the external renderer.

use async_trait::async_trait;

use crate::bridge::value::Value;
use crate::rpc::client::RpcClient;
use crate::rpc::error::RpcError;

/// Renderer method names. Arguments are positional, view first.
pub mod methods {
    pub const LINE: &str = "plot_line";
    pub const ADD_LINE: &str = "plot_addline";
    pub const UPDATE_LINE: &str = "plot_updateline";
    pub const IMAGE: &str = "plot_image";
    pub const IMAGES: &str = "plot_images";
    pub const SURFACE: &str = "plot_surface";
    pub const STACK: &str = "plot_stack";
    pub const UPDATE_STACK: &str = "plot_updatestack";
    pub const POINTS_2D: &str = "plot_points2d";
    pub const UPDATE_POINTS_2D: &str = "plot_updatepoints2d";
    pub const POINTS_3D: &str = "plot_points3d";
    pub const UPDATE_POINTS_3D: &str = "plot_updatepoints3d";
    pub const CREATE_AXIS: &str = "plot_createaxis";
    pub const RENAME_ACTIVE_X_AXIS: &str = "plot_renameactivexaxis";
    pub const RENAME_ACTIVE_Y_AXIS: &str = "plot_renameactiveyaxis";
    pub const CLEAR: &str = "plot_clear";
    pub const EXPORT: &str = "plot_export";
    pub const GET_BEAN: &str = "plot_getbean";
    pub const SET_BEAN: &str = "plot_setbean";
    pub const GET_DATA_BEAN: &str = "plot_getdatabean";
    pub const SET_DATA_BEAN: &str = "plot_setdatabean";
    pub const SCAN_FOR_IMAGES: &str = "plot_scanforimages";
    pub const VIEW_NEXUS_TREE: &str = "plot_viewnexustree";
    pub const VOLUME: &str = "plot_volume";
    pub const GET_GUI_NAMES: &str = "plot_getguinames";
}

/// One fully normalized renderer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub method: &'static str,
    pub args: Vec<Value>,
}

impl RemoteCall {
    pub fn new(method: &'static str, args: Vec<Value>) -> Self {
        Self { method, args }
    }
}

#[async_trait]
pub trait RemoteRenderer: Send {
    async fn invoke(&mut self, call: RemoteCall) -> Result<Value, RpcError>;
}

#[async_trait]
impl RemoteRenderer for RpcClient {
    async fn invoke(&mut self, call: RemoteCall) -> Result<Value, RpcError> {
        self.call(call.method, call.args).await
    }
}
