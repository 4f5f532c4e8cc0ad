//! 报告模块: 结果汇总 / 导出 / 轨迹叠加图
pub mod aggregator;
pub mod export;
pub mod overlay;

pub use aggregator::{
    AggregateReport, CombinedVerdict, LabelStats, MorphologyDiagnosis, MorphologyReport,
    MotilityDiagnosis, MotilityReport, Omissions, ResultAggregator, MORPHOLOGY_THRESHOLD_PCT,
    MOTILITY_THRESHOLD_PCT,
};
pub use export::{particle_records, write_particle_table, write_report_json, ParticleRecord};
pub use overlay::render_tracks;
