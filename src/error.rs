// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Config error {message}"))]
    Config { message: String },
    #[snafu(display("Storage error {source}"))]
    Storage { source: s3acme_storage::Error },
    #[snafu(display("{source}"))]
    Cache { source: s3acme_cache::Error },
    #[snafu(display("Acme error {source}"))]
    Acme { source: s3acme_acme::Error },
    #[snafu(display("Write {file} fail, {source}"))]
    OutputWrite {
        file: String,
        source: std::io::Error,
    },
    #[snafu(display("Logger init fail, {message}"))]
    Logger { message: String },
}

impl From<s3acme_cache::Error> for Error {
    fn from(err: s3acme_cache::Error) -> Self {
        Error::Cache { source: err }
    }
}

impl From<s3acme_storage::Error> for Error {
    fn from(err: s3acme_storage::Error) -> Self {
        Error::Storage { source: err }
    }
}

impl From<s3acme_acme::Error> for Error {
    fn from(err: s3acme_acme::Error) -> Self {
        Error::Acme { source: err }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
