// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! Services layer

pub mod results_persister;

pub use results_persister::{Persistable, ResultsPersister};
