//! Derived figures for subjects and campaigns.

use crate::{
    CampaignForm, CampaignRecord, CampaignSummary, ClientRecord, ClientReport, StudentRecord,
    StudentReport, SubjectForm, SubjectRecord, SubjectSummary,
};
use itertools::Itertools;

/// Arithmetic mean of a school mark and an exam mark.
#[must_use]
pub fn subject_average(school_mark: u32, exam_mark: u32) -> f64 {
    (f64::from(school_mark) + f64::from(exam_mark)) / 2.0
}

/// Predicted result: the mean of the per-subject averages.
/// Returns `None` when there are no subjects to average.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn prediction(averages: &[f64]) -> Option<f64> {
    if averages.is_empty() {
        return None;
    }
    Some(averages.iter().sum::<f64>() / averages.len() as f64)
}

/// Percentage of the MQL target that was reached. Zero when there is no target.
#[must_use]
pub fn conversion_rate(actual_mqls: u64, mql_target: u64) -> f64 {
    if mql_target == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = actual_mqls as f64 / mql_target as f64 * 100.0;
    rate
}

/// Spend per delivered MQL. Zero when nothing was delivered.
#[must_use]
pub fn cost_per_mql(spend: f64, actual_mqls: u64) -> f64 {
    if actual_mqls == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let cost = spend / actual_mqls as f64;
    cost
}

/// Anything carrying a pair of marks.
pub trait SubjectMarks {
    fn school_mark(&self) -> u32;
    fn exam_mark(&self) -> u32;

    fn average(&self) -> f64 {
        subject_average(self.school_mark(), self.exam_mark())
    }
}

impl SubjectMarks for SubjectForm {
    fn school_mark(&self) -> u32 {
        self.school_mark
    }
    fn exam_mark(&self) -> u32 {
        self.exam_mark
    }
}

impl SubjectMarks for SubjectRecord {
    fn school_mark(&self) -> u32 {
        self.school_mark
    }
    fn exam_mark(&self) -> u32 {
        self.exam_mark
    }
}

/// Anything carrying campaign spend and MQL counts.
pub trait CampaignFigures {
    fn channel(&self) -> &str;
    fn spend(&self) -> f64;
    fn mql_target(&self) -> u32;
    fn actual_mqls(&self) -> u32;

    fn conversion_rate(&self) -> f64 {
        conversion_rate(self.actual_mqls().into(), self.mql_target().into())
    }

    fn cost_per_mql(&self) -> f64 {
        cost_per_mql(self.spend(), self.actual_mqls().into())
    }
}

impl CampaignFigures for CampaignForm {
    fn channel(&self) -> &str {
        &self.channel
    }
    fn spend(&self) -> f64 {
        self.spend
    }
    fn mql_target(&self) -> u32 {
        self.mql_target
    }
    fn actual_mqls(&self) -> u32 {
        self.actual_mqls
    }
}

impl CampaignFigures for CampaignRecord {
    fn channel(&self) -> &str {
        &self.channel
    }
    fn spend(&self) -> f64 {
        self.spend
    }
    fn mql_target(&self) -> u32 {
        self.mql_target
    }
    fn actual_mqls(&self) -> u32 {
        self.actual_mqls
    }
}

/// The campaign with the highest conversion rate.
/// Ties keep the earliest campaign; an empty slice has no best campaign.
pub fn best_campaign<C: CampaignFigures>(campaigns: &[C]) -> Option<&C> {
    campaigns.iter().fold(None, |best: Option<&C>, candidate| match best {
        Some(current) if candidate.conversion_rate() <= current.conversion_rate() => Some(current),
        _ => Some(candidate),
    })
}

/// The channel that delivered the most MQLs, summed over its campaigns.
/// Ties keep the channel seen first.
pub fn top_channel<C: CampaignFigures>(campaigns: &[C]) -> Option<String> {
    let totals = campaigns
        .iter()
        .map(|c| (c.channel(), u64::from(c.actual_mqls())))
        .into_grouping_map()
        .sum();

    campaigns
        .iter()
        .map(CampaignFigures::channel)
        .unique()
        .fold(None, |best: Option<(&str, u64)>, channel| {
            let total = totals.get(channel).copied().unwrap_or_default();
            match best {
                Some((_, best_total)) if total <= best_total => best,
                _ => Some((channel, total)),
            }
        })
        .map(|(channel, _)| channel.to_string())
}

/// Totals across a set of campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CampaignTotals {
    pub spend: f64,
    pub mql_target: u64,
    pub actual_mqls: u64,
}

impl CampaignTotals {
    pub fn from_campaigns<C: CampaignFigures>(campaigns: &[C]) -> Self {
        campaigns.iter().fold(Self::default(), |acc, c| Self {
            spend: acc.spend + c.spend(),
            mql_target: acc.mql_target + u64::from(c.mql_target()),
            actual_mqls: acc.actual_mqls + u64::from(c.actual_mqls()),
        })
    }

    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        conversion_rate(self.actual_mqls, self.mql_target)
    }

    #[must_use]
    pub fn cost_per_mql(&self) -> f64 {
        cost_per_mql(self.spend, self.actual_mqls)
    }
}

/// Build a student report from the stored rows.
#[must_use]
pub fn student_report(
    student: StudentRecord,
    subjects: &[SubjectRecord],
    created: bool,
) -> StudentReport {
    let summaries: Vec<SubjectSummary> = subjects
        .iter()
        .map(|s| SubjectSummary {
            name: s.name.clone(),
            school_mark: s.school_mark,
            exam_mark: s.exam_mark,
            average: s.average(),
        })
        .collect();
    let averages: Vec<f64> = summaries.iter().map(|s| s.average).collect();

    StudentReport {
        student,
        subjects: summaries,
        prediction: prediction(&averages),
        created,
    }
}

/// Build a client report from the stored rows.
#[must_use]
pub fn client_report(
    client: ClientRecord,
    campaigns: &[CampaignRecord],
    created: bool,
) -> ClientReport {
    let totals = CampaignTotals::from_campaigns(campaigns);
    let summaries = campaigns
        .iter()
        .map(|c| CampaignSummary {
            campaign_name: c.campaign_name.clone(),
            channel: c.channel.clone(),
            spend: c.spend,
            mql_target: c.mql_target,
            actual_mqls: c.actual_mqls,
            conversion_rate: c.conversion_rate(),
            cost_per_mql: c.cost_per_mql(),
        })
        .collect();

    ClientReport {
        client,
        campaigns: summaries,
        total_spend: totals.spend,
        total_mql_target: totals.mql_target,
        total_mqls: totals.actual_mqls,
        conversion_rate: totals.conversion_rate(),
        cost_per_mql: totals.cost_per_mql(),
        best_campaign: best_campaign(campaigns).map(|c| c.campaign_name.clone()),
        top_channel: top_channel(campaigns),
        created,
    }
}
