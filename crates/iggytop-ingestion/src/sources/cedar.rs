//! CEDAR (https://cedar.iedb.org/), the cancer-focused sibling of IEDB.

use super::iedb::receptor_export;
use super::SourceDefinition;
use crate::download::Asset;

pub const NAME: &str = "cedar";
const URL: &str = "https://cedar.iedb.org/downloader.php?file_name=doc/receptor_full_v3.zip";

pub fn definition() -> SourceDefinition {
    receptor_export(NAME, Asset::url("cedar_latest", URL))
}
