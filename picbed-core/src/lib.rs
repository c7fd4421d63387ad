#![doc = "picbed-core: image upload logic shared by the picbed CLI and its tests."]

//! This crate adapts a single "upload an image" action to one of several interchangeable
//! image hosts (SM.MS, Qiniu, Aliyun OSS, Gitee, GitHub or a user supplied multipart endpoint).
//! The host is picked at runtime from a key-value [`config::ConfigStore`].
//!
//! # Usage
//! Build a [`dispatch::Dispatcher`] from a store, a [`contract::Transport`] and a
//! [`notify::NotificationBridge`], then hand it [`contract::UploadRequest`]s. Outcomes are reported
//! through the request's observer, the notification bridge and the returned result.

pub mod config;
pub mod contract;
pub mod dispatch;
pub mod editor;
pub mod error;
pub mod host;
pub mod naming;
pub mod notify;
pub mod transport;
