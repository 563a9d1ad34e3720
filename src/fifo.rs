use crate::builder::DeferredExpense;
use crate::classify::DocKind;
use crate::model::{Document, IssueSeverity, MovementReport, ParseIssue};
use crate::validate::validate_balance;
use log::{error, warn};

/// Residual below this threshold counts as fully allocated.
pub const ALLOCATION_EPSILON: f64 = 1e-9;

/// Pass 2: applies the deferred consumption queue to the tree built in
/// pass 1, oldest-arrived batch first.
///
/// Allocation is best-effort and always terminates: unknown products and
/// insufficient stock are recorded as errors, partial allocations are kept.
pub fn allocate_deferred(report: &mut MovementReport, ops: &[DeferredExpense]) {
    let MovementReport {
        sections, issues, ..
    } = report;

    for op in ops {
        // Exact-name lookup, first match across sections. Product names
        // are assumed unique per run; duplicates beyond the first are
        // never allocated against.
        let Some(product) = sections
            .iter_mut()
            .flat_map(|section| section.products.iter_mut())
            .find(|product| product.name == op.product)
        else {
            push_issue(
                issues,
                IssueSeverity::Error,
                format!(
                    "consumption document '{}' references unknown product '{}'; {} dropped",
                    op.document, op.product, op.quantity
                ),
            );
            continue;
        };

        let mut order: Vec<usize> = (0..product.batches.len()).collect();
        order.sort_by_key(|&i| product.batches[i].arrival());

        let mut remaining = op.quantity;
        for &i in &order {
            if remaining <= ALLOCATION_EPSILON {
                break;
            }
            let batch = &mut product.batches[i];
            if batch.qty.end <= ALLOCATION_EPSILON {
                continue;
            }

            let consumed = remaining.min(batch.qty.end);
            batch.qty.qty_out += consumed;
            batch.qty.end -= consumed;
            if batch.qty.end < -ALLOCATION_EPSILON {
                let deficit = -batch.qty.end;
                push_issue(
                    issues,
                    IssueSeverity::Warning,
                    format!(
                        "batch '{}' of '{}' driven {} below zero by '{}'; clamped to 0",
                        batch.batch_code, op.product, deficit, op.document
                    ),
                );
                batch.qty.end = 0.0;
            } else if batch.qty.end < 0.0 {
                batch.qty.end = 0.0;
            }

            batch.validation =
                validate_balance(batch.qty.begin, batch.qty.qty_in, batch.qty.qty_out, batch.qty.end);
            if !batch.validation.valid {
                push_issue(
                    issues,
                    IssueSeverity::Error,
                    format!(
                        "batch '{}' of '{}' fails balance validation after allocation (diff {})",
                        batch.batch_code, op.product, batch.validation.diff
                    ),
                );
            }

            batch.documents.push(Document {
                doc_type: DocKind::Expense,
                name: op.document.clone(),
                qty_in: 0.0,
                qty_out: consumed,
            });
            remaining -= consumed;
        }

        if remaining > ALLOCATION_EPSILON {
            push_issue(
                issues,
                IssueSeverity::Error,
                format!(
                    "insufficient stock of '{}' for '{}': {} of {} unallocated",
                    op.product, op.document, remaining, op.quantity
                ),
            );
        }
    }
}

fn push_issue(issues: &mut Vec<ParseIssue>, severity: IssueSeverity, message: String) {
    match severity {
        IssueSeverity::Warning => warn!("{}", message),
        IssueSeverity::Error => error!("{}", message),
    }
    issues.push(ParseIssue {
        row: None,
        severity,
        message,
    });
}
