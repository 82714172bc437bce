use super::binder::resolve_assignment;
use super::policy::{
    cap_percent, format_one_decimal, format_score, FivePointSettings,
    FIVE_POINT_MAX,
};
use crate::model::{Assignment, DateRange, Grade, GradingSystem, SubjectAverage};
use serde::Serialize;
use std::collections::HashSet;

/// Everything that identifies one aggregate.
#[derive(Debug, Clone, Copy)]
pub struct AggregateQuery<'a> {
    pub student_id: &'a str,
    pub subject_id: &'a str,
    pub subgroup_id: Option<&'a str>,
    pub grading_system: GradingSystem,
    pub range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub grading_system: GradingSystem,
    /// Weighted mean (five-point) or earned points (cumulative).
    pub average: Option<f64>,
    pub percentage: Option<f64>,
    pub earned: f64,
    pub possible: f64,
    pub counted: usize,
    /// Cumulative grades left out because no assignment resolved for them.
    pub excluded: usize,
}

impl Aggregate {
    fn no_data(grading_system: GradingSystem, excluded: usize) -> Self {
        Self {
            grading_system,
            average: None,
            percentage: None,
            earned: 0.0,
            possible: 0.0,
            counted: 0,
            excluded,
        }
    }

    pub fn to_subject_average(&self) -> SubjectAverage {
        let (Some(average), Some(percentage)) = (self.average, self.percentage) else {
            return SubjectAverage::no_data();
        };
        match self.grading_system {
            GradingSystem::FivePoint => SubjectAverage {
                average: format_one_decimal(average),
                percentage: format_one_decimal(percentage),
                max_score: None,
            },
            GradingSystem::Cumulative => SubjectAverage {
                average: format_score(average),
                percentage: format_one_decimal(percentage),
                max_score: Some(format_score(self.possible)),
            },
        }
    }
}

/// Grades that count toward the query: exact subject, student and subgroup
/// (an unscoped query only takes unscoped grades), inside the date range,
/// each grade record at most once.
pub fn select_grades<'a>(grades: &'a [Grade], query: &AggregateQuery<'_>) -> Vec<&'a Grade> {
    let mut seen: HashSet<&str> = HashSet::new();
    grades
        .iter()
        .filter(|g| g.subject_id == query.subject_id)
        .filter(|g| g.student_id == query.student_id)
        .filter(|g| g.subgroup_id.as_deref() == query.subgroup_id)
        .filter(|g| query.range.contains(g.day()))
        .filter(|g| seen.insert(g.id.as_str()))
        .collect()
}

pub fn aggregate(
    grades: &[Grade],
    query: &AggregateQuery<'_>,
    assignments: &[Assignment],
    five_point: &FivePointSettings,
) -> Aggregate {
    let selected = select_grades(grades, query);
    match query.grading_system {
        GradingSystem::FivePoint => five_point_average(&selected, five_point),
        GradingSystem::Cumulative => cumulative_percentage(&selected, assignments),
    }
}

fn five_point_average(grades: &[&Grade], settings: &FivePointSettings) -> Aggregate {
    let mut weighted_sum = 0.0_f64;
    let mut total_weight = 0.0_f64;
    let mut counted = 0_usize;

    for g in grades {
        let weight = settings.weight(&g.grade_type);
        if weight <= 0.0 {
            continue;
        }
        weighted_sum += g.score * weight;
        total_weight += weight;
        counted += 1;
    }

    if total_weight <= 0.0 {
        return Aggregate::no_data(GradingSystem::FivePoint, 0);
    }
    let average = weighted_sum / total_weight;
    Aggregate {
        grading_system: GradingSystem::FivePoint,
        average: Some(average),
        percentage: Some(cap_percent(average / FIVE_POINT_MAX * 100.0)),
        earned: weighted_sum,
        possible: total_weight,
        counted,
        excluded: 0,
    }
}

fn cumulative_percentage(grades: &[&Grade], assignments: &[Assignment]) -> Aggregate {
    let mut earned = 0.0_f64;
    let mut possible = 0.0_f64;
    let mut counted = 0_usize;
    let mut excluded = 0_usize;

    for g in grades {
        let Some(a) = resolve_assignment(g, assignments) else {
            excluded += 1;
            continue;
        };
        earned += g.score;
        possible += a.max_score;
        counted += 1;
    }

    if possible <= 0.0 {
        return Aggregate::no_data(GradingSystem::Cumulative, excluded);
    }
    Aggregate {
        grading_system: GradingSystem::Cumulative,
        average: Some(earned),
        percentage: Some(cap_percent(earned / possible * 100.0)),
        earned,
        possible,
        counted,
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::policy::{round_off_1_decimal, FivePointMethod};
    use crate::model::{AssignmentType, GradeType};
    use chrono::{NaiveDate, TimeZone, Utc};

    struct Fixture {
        next: usize,
        grades: Vec<Grade>,
        assignments: Vec<Assignment>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                next: 0,
                grades: Vec::new(),
                assignments: Vec::new(),
            }
        }

        fn assignment(&mut self, max_score: f64) -> String {
            self.next += 1;
            let id = format!("A{}", self.next);
            self.assignments.push(Assignment {
                id: id.clone(),
                schedule_id: format!("L{}", self.next),
                class_id: "c1".into(),
                subject_id: "math".into(),
                teacher_id: "t1".into(),
                subgroup_id: None,
                assignment_type: AssignmentType::CurrentWork,
                max_score,
                description: None,
                planned_for: false,
            });
            id
        }

        fn grade(&mut self, score: f64, grade_type: &str, assignment_id: Option<&str>) -> &mut Grade {
            self.next += 1;
            self.grades.push(Grade {
                id: format!("G{}", self.next),
                student_id: "S".into(),
                subject_id: "math".into(),
                class_id: "c1".into(),
                teacher_id: "t1".into(),
                score,
                grade_type: GradeType::from(grade_type),
                comment: None,
                subgroup_id: None,
                schedule_id: None,
                assignment_id: assignment_id.map(Into::into),
                created_at: Utc.with_ymd_and_hms(2024, 9, 10, 9, 0, 0).unwrap(),
            });
            self.grades.last_mut().expect("just pushed")
        }
    }

    fn query(system: GradingSystem) -> AggregateQuery<'static> {
        AggregateQuery {
            student_id: "S",
            subject_id: "math",
            subgroup_id: None,
            grading_system: system,
            range: DateRange::default(),
        }
    }

    #[test]
    fn cumulative_scenario_sums_points() {
        let mut f = Fixture::new();
        let a1 = f.assignment(5.0);
        let a2 = f.assignment(10.0);
        f.grade(4.0, "current_work", Some(&a1));
        f.grade(9.0, "current_work", Some(&a2));

        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::Cumulative),
            &f.assignments,
            &FivePointSettings::default(),
        );
        assert_eq!(agg.earned, 13.0);
        assert_eq!(agg.possible, 15.0);
        assert_eq!(agg.percentage.map(round_off_1_decimal), Some(86.7));

        let shown = agg.to_subject_average();
        assert_eq!(shown.average, "13");
        assert_eq!(shown.percentage, "86.7");
        assert_eq!(shown.max_score.as_deref(), Some("15"));
    }

    #[test]
    fn five_point_scenario_weights_by_type() {
        let mut f = Fixture::new();
        for s in [5.0, 4.0, 3.0] {
            f.grade(s, "test", None);
        }
        f.grade(4.0, "homework", None);

        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::FivePoint),
            &f.assignments,
            &FivePointSettings::default(),
        );
        assert_eq!(agg.earned, 28.0);
        assert_eq!(agg.possible, 7.0);
        assert_eq!(agg.average, Some(4.0));
        let shown = agg.to_subject_average();
        assert_eq!(shown.average, "4.0");
        assert_eq!(shown.percentage, "80.0");
        assert_eq!(shown.max_score, None);
    }

    #[test]
    fn five_point_percentage_matches_average_over_five() {
        let mut f = Fixture::new();
        f.grade(5.0, "exam", None);
        f.grade(3.0, "classwork", None);
        f.grade(4.0, "test", None);
        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::FivePoint),
            &f.assignments,
            &FivePointSettings::default(),
        );
        let avg = agg.average.expect("average");
        let expected = (5.0 * 3.0 + 3.0 + 4.0 * 2.0) / 6.0;
        assert!((avg - expected).abs() < 1e-9);
        let pct = agg.percentage.expect("percentage");
        assert!((pct - (avg / 5.0 * 100.0).min(100.0)).abs() < 1e-9);
    }

    #[test]
    fn simple_method_ignores_weights() {
        let mut f = Fixture::new();
        f.grade(5.0, "exam", None);
        f.grade(3.0, "homework", None);
        let settings = FivePointSettings {
            method: FivePointMethod::Simple,
            ..FivePointSettings::default()
        };
        let agg = aggregate(&f.grades, &query(GradingSystem::FivePoint), &[], &settings);
        assert_eq!(agg.average, Some(4.0));
    }

    #[test]
    fn zero_weight_types_drop_out_and_can_empty_the_set() {
        let mut f = Fixture::new();
        f.grade(2.0, "homework", None);
        let mut settings = FivePointSettings::default();
        settings.weights.insert("homework".into(), 0.0);
        let agg = aggregate(&f.grades, &query(GradingSystem::FivePoint), &[], &settings);
        assert_eq!(agg.average, None);
        assert_eq!(agg.to_subject_average(), SubjectAverage::no_data());
    }

    #[test]
    fn empty_input_is_no_data_in_both_systems() {
        for system in [GradingSystem::FivePoint, GradingSystem::Cumulative] {
            let agg = aggregate(&[], &query(system), &[], &FivePointSettings::default());
            let shown = agg.to_subject_average();
            assert_eq!(shown.average, "-");
            assert_eq!(shown.percentage, "-");
            assert!(shown.is_no_data());
        }
    }

    #[test]
    fn unresolved_cumulative_grades_are_excluded_and_counted() {
        let mut f = Fixture::new();
        let a = f.assignment(10.0);
        f.grade(6.0, "current_work", Some(&a));
        f.grade(99.0, "current_work", Some("missing"));
        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::Cumulative),
            &f.assignments,
            &FivePointSettings::default(),
        );
        assert_eq!(agg.counted, 1);
        assert_eq!(agg.excluded, 1);
        assert_eq!(agg.percentage, Some(60.0));
    }

    #[test]
    fn cumulative_with_only_unresolved_grades_is_no_data() {
        let mut f = Fixture::new();
        f.grade(6.0, "current_work", None);
        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::Cumulative),
            &[],
            &FivePointSettings::default(),
        );
        assert_eq!(agg.percentage, None);
        assert_eq!(agg.excluded, 1);
        assert!(agg.to_subject_average().is_no_data());
    }

    #[test]
    fn cumulative_percentage_stays_within_bounds() {
        let mut f = Fixture::new();
        let a = f.assignment(5.0);
        f.grade(50.0, "current_work", Some(&a));
        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::Cumulative),
            &f.assignments,
            &FivePointSettings::default(),
        );
        let pct = agg.percentage.expect("percentage");
        assert!((0.0..=100.0).contains(&pct));
        assert_eq!(pct, 100.0);
    }

    #[test]
    fn subgroup_scoping_is_exact() {
        let mut f = Fixture::new();
        f.grade(5.0, "classwork", None);
        f.grade(2.0, "classwork", None).subgroup_id = Some("sg1".into());

        let unscoped = aggregate(
            &f.grades,
            &query(GradingSystem::FivePoint),
            &[],
            &FivePointSettings::default(),
        );
        assert_eq!(unscoped.average, Some(5.0));

        let mut scoped_query = query(GradingSystem::FivePoint);
        scoped_query.subgroup_id = Some("sg1");
        let scoped = aggregate(&f.grades, &scoped_query, &[], &FivePointSettings::default());
        assert_eq!(scoped.average, Some(2.0));
    }

    #[test]
    fn repeated_grade_records_count_once() {
        let mut f = Fixture::new();
        f.grade(5.0, "classwork", None).schedule_id = Some("L1".into());
        f.grade(3.0, "classwork", None).schedule_id = Some("L2".into());
        let dup = f.grades[0].clone();
        f.grades.push(dup);

        let agg = aggregate(
            &f.grades,
            &query(GradingSystem::FivePoint),
            &[],
            &FivePointSettings::default(),
        );
        assert_eq!(agg.counted, 2);
        assert_eq!(agg.average, Some(4.0));
    }

    #[test]
    fn date_range_uses_the_grade_day() {
        let mut f = Fixture::new();
        f.grade(5.0, "classwork", None).created_at = Utc.with_ymd_and_hms(2024, 9, 1, 23, 59, 0).unwrap();
        f.grade(1.0, "classwork", None).created_at = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();

        let mut q = query(GradingSystem::FivePoint);
        q.range = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 9, 1),
            to: NaiveDate::from_ymd_opt(2024, 9, 30),
        };
        let agg = aggregate(&f.grades, &q, &[], &FivePointSettings::default());
        assert_eq!(agg.average, Some(5.0));
    }

    #[test]
    fn aggregate_is_repeatable() {
        let mut f = Fixture::new();
        let a = f.assignment(7.0);
        f.grade(3.0, "current_work", Some(&a));
        f.grade(4.0, "exam", None);
        for system in [GradingSystem::FivePoint, GradingSystem::Cumulative] {
            let q = query(system);
            let first = aggregate(&f.grades, &q, &f.assignments, &FivePointSettings::default());
            let second = aggregate(&f.grades, &q, &f.assignments, &FivePointSettings::default());
            assert_eq!(first, second);
        }
    }
}
