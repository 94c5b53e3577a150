pub mod band_factor;
pub mod rpa;

pub use band_factor::BandFactor;
pub use rpa::RpaPredictionModel;

use std::fmt::Write as FmtWrite;

use crate::error::TaxatorResult;
use crate::types::{PredictionRecord, RecordSet};

/// A taxonomic placement model: consumes one query's record set and fills a
/// prediction record, writing its trace to `logsink`. Implementations may
/// mutate only the records' `filtered` flags.
pub trait PredictionModel {
    fn predict(
        &self,
        recordset: &mut RecordSet,
        prec: &mut PredictionRecord,
        logsink: &mut String,
    ) -> TaxatorResult<()>;
}

/// Fill a prediction record for a query without usable alignments: the whole
/// range collapses onto the root.
pub fn set_unclassified(prec: &mut PredictionRecord, root: u32) {
    prec.set_query_feature_begin(0);
    prec.set_query_feature_end(0);
    prec.set_interpolation_value(1.0);
    prec.set_node_range(root, root, 0);
    prec.set_best_reference_taxon(root);
}

/// Place every record set sequentially. A failing query loses its prediction
/// and leaves a diagnostic line in the returned log; the remaining queries
/// are unaffected.
pub fn predict_queries<M: PredictionModel>(
    model: &M,
    recordsets: &mut [RecordSet],
) -> (Vec<PredictionRecord>, String) {
    let mut predictions = Vec::with_capacity(recordsets.len());
    let mut log_output = String::new();

    for recordset in recordsets.iter_mut() {
        let mut prec = PredictionRecord::new(
            recordset.query_identifier.clone(),
            recordset.query_length,
        );
        let mut logsink = String::new();
        match model.predict(recordset, &mut prec, &mut logsink) {
            Ok(()) => {
                log_output.push_str(&logsink);
                predictions.push(prec);
            }
            Err(e) => {
                log_output.push_str(&logsink);
                let _ = writeln!(log_output, "ERROR\t{}\t{e}\n", recordset.query_identifier);
                log::warn!(
                    "placement of query '{}' failed: {e}",
                    recordset.query_identifier
                );
            }
        }
    }
    (predictions, log_output)
}
